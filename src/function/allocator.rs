use crate::abi::Abi;
use crate::error::{Error, Result};
use crate::instructions::{Instruction, InstructionKind};
use crate::isa::Microarchitecture;
use crate::registers::{Register, RegisterKind};

use log::debug;

use std::collections::{BTreeSet, HashMap};

/// Allocation options and conflicts collected from the live sets.
pub(crate) struct AllocatorState {
    /// Candidate root bitboards per virtual register id.
    options: HashMap<u32, Vec<u64>>,
    /// Joint options per grouped id tuple, kept in detection order.
    group_options: Vec<(Vec<u32>, Vec<Vec<u64>>)>,
    /// Mutual conflict edges between simultaneously live virtuals.
    conflicts: HashMap<u32, BTreeSet<u32>>,
    /// Ids in first-seen order; duplicates are skipped at bind time.
    unallocated: Vec<UnallocatedEntry>,
}

#[derive(Clone, Debug)]
enum UnallocatedEntry {
    Register(u32),
    Group(Vec<u32>),
}

fn default_options(kind: RegisterKind, abi: Abi, target: Microarchitecture) -> Vec<u64> {
    match kind {
        RegisterKind::GeneralPurpose => {
            let mut options = Vec::new();
            for register in abi.allocatable_registers() {
                let bitboard = register.bitboard();
                if !options.contains(&bitboard) {
                    options.push(bitboard);
                }
            }
            options
        }
        RegisterKind::Wmmx => (0..16).map(|n| 0x1u64 << n).collect(),
        RegisterKind::S => (0..32).map(|n| 0x1u64 << n).collect(),
        RegisterKind::D => {
            let slots = if target.has_vfp_d32() { 64 } else { 32 };
            (0..slots).step_by(2).map(|n| 0x3u64 << n).collect()
        }
        RegisterKind::Q => (0..64).step_by(4).map(|n| 0xFu64 << n).collect(),
    }
}

/// Seeds per-register options, prunes them against live physical
/// registers, and derives grouped constraints from multi-register
/// load/store instructions.
pub(crate) fn determine_register_relations(
    instructions: &[Instruction],
    abi: Abi,
    target: Microarchitecture,
) -> Result<AllocatorState> {
    let mut state = AllocatorState {
        options: HashMap::new(),
        group_options: Vec::new(),
        conflicts: HashMap::new(),
        unallocated: Vec::new(),
    };

    for instruction in instructions {
        let live = instruction.live_register_list();
        let virtual_live: Vec<Register> = live
            .iter()
            .copied()
            .filter(|register| register.is_virtual())
            .collect();
        for register_x in &virtual_live {
            state
                .options
                .entry(register_x.id())
                .or_insert_with(|| default_options(register_x.root_kind(), abi, target));
            state
                .unallocated
                .push(UnallocatedEntry::Register(register_x.id()));

            let conflicts = state.conflicts.entry(register_x.id()).or_default();
            for register_y in &virtual_live {
                // VFP registers conflict even when their sizes differ.
                if register_x.id() != register_y.id() && register_x.bank() == register_y.bank() {
                    conflicts.insert(register_y.id());
                }
            }
        }
    }

    // A physical register that is live anywhere cannot be handed to a
    // simultaneously live virtual one.
    for instruction in instructions {
        let live = instruction.live_register_list();
        for virtual_register in live.iter().filter(|register| register.is_virtual()) {
            for physical_register in live.iter().filter(|register| !register.is_virtual()) {
                if virtual_register.bank() == physical_register.bank() {
                    let physical_bitboard = physical_register.bitboard();
                    if let Some(options) = state.options.get_mut(&virtual_register.id()) {
                        options.retain(|&bitboard| bitboard & physical_bitboard == 0);
                    }
                }
            }
        }
    }

    detect_group_constraints(instructions, target, &mut state)?;
    Ok(state)
}

/// NEON VLD1/VST1 and VFP VLDM/VSTM need their register lists in
/// contiguous physical slots, in order. Every feasible placement of the
/// list becomes one joint option over the tuple of member ids.
fn detect_group_constraints(
    instructions: &[Instruction],
    target: Microarchitecture,
    state: &mut AllocatorState,
) -> Result<()> {
    let mut constraints: Vec<(Vec<u32>, Vec<Vec<u64>>)> = Vec::new();

    for instruction in instructions {
        let (register_list, slot_granular, physical_count) = match &instruction.kind {
            InstructionKind::NeonLoad { registers, .. }
            | InstructionKind::NeonStore { registers, .. } => (registers, false, 32u32),
            InstructionKind::VfpLoadMultiple { registers, .. }
            | InstructionKind::VfpStoreMultiple { registers, .. } => {
                let count = if target.has_vfp_d32() { 32 } else { 16 };
                (registers, true, count)
            }
            _ => continue,
        };
        if register_list.len() < 2 {
            continue;
        }
        if register_list.iter().any(|register| !register.is_virtual()) {
            continue;
        }
        let all_d = register_list
            .iter()
            .all(|register| register.kind() == RegisterKind::D);
        let all_s = register_list
            .iter()
            .all(|register| register.kind() == RegisterKind::S);
        let (stride, shape, slots) = if all_d {
            (2u32, 0x3u64, 2 * physical_count)
        } else if all_s && slot_granular {
            (1u32, 0x1u64, 32)
        } else {
            continue;
        };
        // Lists with a dead member never got options seeded; leave them
        // unconstrained.
        if register_list
            .iter()
            .any(|register| !state.options.contains_key(&register.id()))
        {
            continue;
        }

        let mut register_id_list: Vec<u32> = Vec::new();
        for register in register_list {
            if !register_id_list.contains(&register.id()) {
                register_id_list.push(register.id());
            }
        }

        let mut options: Vec<Vec<u64>> = Vec::new();
        let list_len = register_list.len() as u32;
        let mut position = 0u32;
        while position + stride * list_len <= slots {
            if let Some(option) = try_group_placement(
                register_list,
                &register_id_list,
                position,
                stride,
                shape,
                &state.options,
            ) {
                options.push(option);
            }
            position += stride;
        }
        if options.is_empty() {
            return Err(Error::RegisterAllocation(format!(
                "Impossible virtual register combination in instruction {}",
                instruction.kind
            )));
        }
        if register_id_list.len() < 2 {
            continue;
        }
        match constraints
            .iter_mut()
            .find(|(ids, _)| *ids == register_id_list)
        {
            Some((_, existing)) => {
                existing.retain(|option| options.contains(option));
                if existing.is_empty() {
                    return Err(Error::RegisterAllocation(format!(
                        "Impossible virtual register combination in instruction {}",
                        instruction.kind
                    )));
                }
            }
            None => constraints.push((register_id_list, options)),
        }
    }

    // Each id must belong to at most one group; grouped ids leave the
    // scalar pools.
    let grouped_ids: Vec<u32> = constraints
        .iter()
        .flat_map(|(ids, _)| ids.iter().copied())
        .collect();
    debug_assert_eq!(
        grouped_ids.len(),
        grouped_ids.iter().collect::<BTreeSet<_>>().len()
    );
    state.unallocated.retain(|entry| match entry {
        UnallocatedEntry::Register(id) => !grouped_ids.contains(id),
        UnallocatedEntry::Group(_) => true,
    });
    for id in &grouped_ids {
        state.options.remove(id);
    }
    for (ids, options) in constraints {
        debug!(
            "register group {:?}: {} joint allocation options",
            ids,
            options.len()
        );
        state
            .unallocated
            .push(UnallocatedEntry::Group(ids.clone()));
        state.group_options.push((ids, options));
    }
    Ok(())
}

/// One candidate placement of a register list starting at `position`:
/// members map to consecutive slots; members sharing an id must land on
/// the same bitboard; distinct ids must not overlap; every extended root
/// bitboard must still be among that register's options.
fn try_group_placement(
    register_list: &[Register],
    register_id_list: &[u32],
    position: u32,
    stride: u32,
    shape: u64,
    options: &HashMap<u32, Vec<u64>>,
) -> Option<Vec<u64>> {
    let mut id_map: Vec<(u32, u64)> = Vec::new();
    for (index, register) in register_list.iter().enumerate() {
        let member_bitboard = shape << (position + stride * index as u32);
        let root_bitboard = register.extend_to_root(member_bitboard)?;
        if !options.get(&register.id())?.contains(&root_bitboard) {
            return None;
        }
        match id_map.iter().find(|(id, _)| *id == register.id()) {
            Some((_, existing)) => {
                if *existing != root_bitboard {
                    return None;
                }
            }
            None => id_map.push((register.id(), root_bitboard)),
        }
    }
    let mut occupied = 0u64;
    for (_, bitboard) in &id_map {
        if occupied & bitboard != 0 {
            return None;
        }
        occupied |= bitboard;
    }
    Some(
        register_id_list
            .iter()
            .map(|id| {
                id_map
                    .iter()
                    .find(|(map_id, _)| map_id == id)
                    .map(|(_, bitboard)| *bitboard)
                    .expect("grouped id missing from placement map")
            })
            .collect(),
    )
}

/// Greedy three-pass allocation: argument hints, then grouped tuples,
/// then scalars, pruning conflicting options after every binding.
pub(crate) fn allocate_registers(
    instructions: &[Instruction],
    state: &mut AllocatorState,
) -> Result<HashMap<u32, u64>> {
    let mut allocation: HashMap<u32, u64> = HashMap::new();

    // Arguments that already sit in a physical register keep it when the
    // options still allow that.
    for instruction in instructions {
        if let InstructionKind::LoadArgument {
            destination,
            source: crate::abi::ArgumentLocation::Register(register),
            ..
        } = &instruction.kind
        {
            if destination.is_virtual() && !allocation.contains_key(&destination.id()) {
                let bitboard = register.bitboard();
                if state
                    .options
                    .get(&destination.id())
                    .map_or(false, |options| options.contains(&bitboard))
                {
                    bind(state, &mut allocation, destination.id(), bitboard);
                }
            }
        }
    }

    // Grouped tuples next, so scalars cannot eat the contiguous runs the
    // groups depend on.
    let entries: Vec<UnallocatedEntry> = state.unallocated.clone();
    for entry in &entries {
        if let UnallocatedEntry::Group(ids) = entry {
            let option = state
                .group_options
                .iter()
                .find(|(group_ids, _)| group_ids == ids)
                .and_then(|(_, options)| options.first().cloned())
                .ok_or_else(|| {
                    Error::RegisterAllocation(
                        "No remaining allocation options for register group".to_owned(),
                    )
                })?;
            for (id, bitboard) in ids.iter().zip(option) {
                bind(state, &mut allocation, *id, bitboard);
            }
        }
    }

    for entry in &entries {
        if let UnallocatedEntry::Register(id) = entry {
            if allocation.contains_key(id) {
                continue;
            }
            let bitboard = state
                .options
                .get(id)
                .and_then(|options| options.first().copied())
                .ok_or_else(|| {
                    Error::RegisterAllocation(format!(
                        "No remaining allocation options for virtual register {}",
                        id >> 4
                    ))
                })?;
            bind(state, &mut allocation, *id, bitboard);
        }
    }

    debug!("allocated {} virtual registers", allocation.len());
    Ok(allocation)
}

/// Records the binding and removes every overlapping option from the
/// conflicting registers, scalar and grouped alike.
fn bind(state: &mut AllocatorState, allocation: &mut HashMap<u32, u64>, id: u32, bitboard: u64) {
    let conflicting: Vec<u32> = state
        .conflicts
        .get(&id)
        .map(|conflicts| conflicts.iter().copied().collect())
        .unwrap_or_default();
    for conflicting_id in conflicting {
        if let Some(options) = state.options.get_mut(&conflicting_id) {
            options.retain(|&option| option & bitboard == 0);
        }
        for (group_ids, group_options) in state.group_options.iter_mut() {
            if let Some(position) = group_ids.iter().position(|&gid| gid == conflicting_id) {
                group_options.retain(|option| option[position] & bitboard == 0);
            }
        }
    }
    allocation.insert(id, bitboard);
}

/// Rewrites every virtual register occurrence to its physical binding.
pub(crate) fn rebind_registers(
    instructions: &mut [Instruction],
    allocation: &HashMap<u32, u64>,
) {
    for instruction in instructions.iter_mut() {
        instruction.kind.for_each_register_mut(|register| {
            if register.is_virtual() {
                if let Some(&root_bitboard) = allocation.get(&register.id()) {
                    *register = register.bind_to_root(root_bitboard);
                }
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instructions::{Instruction, MemoryOperand};
    use crate::registers::{Register, RegisterKind, R0};

    fn live(instruction: &mut Instruction, registers: &[Register]) {
        for register in registers {
            *instruction
                .live_registers
                .entry(register.id())
                .or_insert(0) |= register.mask();
        }
    }

    #[test]
    fn conflicting_registers_get_disjoint_bitboards() {
        let a = Register::virtual_register(RegisterKind::GeneralPurpose, 0x40);
        let b = Register::virtual_register(RegisterKind::GeneralPurpose, 0x41);
        let mut instruction = Instruction::new(InstructionKind::Binary {
            op: crate::instructions::BinaryOp::Add,
            flags: false,
            rd: b,
            rn: a,
            op2: crate::instructions::Operand2::Register(b),
        });
        live(&mut instruction, &[a, b]);
        let instructions = vec![instruction];
        let mut state =
            determine_register_relations(&instructions, Abi::GnuEabi, Microarchitecture::CortexA9)
                .unwrap();
        let allocation = allocate_registers(&instructions, &mut state).unwrap();
        assert_ne!(allocation[&a.id()], allocation[&b.id()]);
    }

    #[test]
    fn live_physical_registers_are_pruned_from_options() {
        let a = Register::virtual_register(RegisterKind::GeneralPurpose, 0x40);
        let mut instruction = Instruction::new(InstructionKind::Unary {
            op: crate::instructions::UnaryOp::Mov,
            flags: false,
            rd: a,
            src: crate::instructions::Operand2::Register(R0),
        });
        live(&mut instruction, &[a, R0]);
        let instructions = vec![instruction];
        let mut state =
            determine_register_relations(&instructions, Abi::GnuEabi, Microarchitecture::CortexA9)
                .unwrap();
        let allocation = allocate_registers(&instructions, &mut state).unwrap();
        assert_ne!(allocation[&a.id()], R0.bitboard());
    }

    #[test]
    fn grouped_registers_land_on_contiguous_slots() {
        let a = Register::virtual_register(RegisterKind::D, 0x40);
        let b = Register::virtual_register(RegisterKind::D, 0x41);
        let mut instruction = Instruction::new(InstructionKind::NeonLoad {
            registers: vec![a, b],
            address: MemoryOperand::register(R0),
        });
        live(&mut instruction, &[a, b]);
        let instructions = vec![instruction];
        let mut state =
            determine_register_relations(&instructions, Abi::GnuEabi, Microarchitecture::CortexA9)
                .unwrap();
        let allocation = allocate_registers(&instructions, &mut state).unwrap();
        let bitboard_a = allocation[&a.id()];
        let bitboard_b = allocation[&b.id()];
        assert_eq!(bitboard_b, bitboard_a << 2);
        assert_eq!(bitboard_a & bitboard_b, 0);
    }

    #[test]
    fn wmmx_registers_allocate_from_their_own_bank() {
        let w = Register::virtual_register(RegisterKind::Wmmx, 0x40);
        let g = Register::virtual_register(RegisterKind::GeneralPurpose, 0x41);
        let mut instruction = Instruction::new(InstructionKind::AssumeInitialized { register: w });
        live(&mut instruction, &[w, g]);
        let instructions = vec![instruction];
        let mut state =
            determine_register_relations(&instructions, Abi::GnuEabi, Microarchitecture::CortexA9)
                .unwrap();
        let allocation = allocate_registers(&instructions, &mut state).unwrap();
        // Different banks never conflict, so both take their first slot.
        assert_eq!(allocation[&w.id()], 0x1);
        assert_eq!(
            allocation[&g.id()],
            crate::registers::R12.bitboard()
        );
    }

    #[test]
    fn q_halves_allocate_as_one_root() {
        let q = Register::virtual_register(RegisterKind::Q, 0x40);
        let mut instruction = Instruction::new(InstructionKind::NeonLoad {
            registers: vec![q.low(), q.high()],
            address: MemoryOperand::register(R0),
        });
        live(&mut instruction, &[q]);
        let instructions = vec![instruction];
        let mut state =
            determine_register_relations(&instructions, Abi::GnuEabi, Microarchitecture::CortexA9)
                .unwrap();
        let allocation = allocate_registers(&instructions, &mut state).unwrap();
        // A single Q-shaped binding covers both halves.
        assert_eq!(allocation[&q.id()].count_ones(), 4);
    }
}
