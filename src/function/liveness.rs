use crate::error::{Error, Result};
use crate::instructions::{Instruction, InstructionKind};
use crate::registers::Register;

use std::collections::{HashMap, HashSet};

pub(crate) fn label_table(instructions: &[Instruction]) -> HashMap<String, usize> {
    let mut table = HashMap::new();
    for (index, instruction) in instructions.iter().enumerate() {
        if let Some(name) = instruction.kind.label_name() {
            table.insert(name.to_owned(), index);
        }
    }
    table
}

/// For every label, the indices of the branches that target it.
fn input_branches(instructions: &[Instruction]) -> Result<HashMap<usize, Vec<usize>>> {
    let labels = label_table(instructions);
    let mut branches: HashMap<usize, Vec<usize>> = HashMap::new();
    for (index, instruction) in instructions.iter().enumerate() {
        if let Some(target) = instruction.kind.branch_target() {
            let target_index = *labels.get(target).ok_or_else(|| Error::UnknownLabel {
                label: target.to_owned(),
            })?;
            branches.entry(target_index).or_default().push(index);
        }
    }
    Ok(branches)
}

/// Forward pass from ENTRY: records, per instruction, the registers that
/// have been written on the walk that reached it. Each branch target is
/// descended into once.
pub(crate) fn determine_available_registers(
    instructions: &mut [Instruction],
    entry: usize,
) -> Result<()> {
    let labels = label_table(instructions);
    let mut processed_branches = HashSet::new();
    mark_available(
        instructions,
        &labels,
        &mut processed_branches,
        entry,
        HashSet::new(),
    )
}

fn mark_available(
    instructions: &mut [Instruction],
    labels: &HashMap<String, usize>,
    processed_branches: &mut HashSet<usize>,
    start: usize,
    mut available: HashSet<Register>,
) -> Result<()> {
    for index in start..instructions.len() {
        if instructions[index].kind.is_label() {
            continue;
        }
        instructions[index].available_registers = available.clone();
        let kind = instructions[index].kind.clone();
        if let Some(target) = kind.branch_target() {
            if processed_branches.insert(index) {
                let target_index = *labels.get(target).ok_or_else(|| Error::UnknownLabel {
                    label: target.to_owned(),
                })?;
                mark_available(
                    instructions,
                    labels,
                    processed_branches,
                    target_index,
                    available.clone(),
                )?;
            }
            if !kind.is_conditional_branch() {
                return Ok(());
            }
        } else if kind.is_terminator() {
            return Ok(());
        } else {
            available.extend(kind.output_registers());
        }
    }
    Ok(())
}

/// Backward fixpoint from every exit point. The live set is a map from
/// register id to the live subfield mask; at a label the current map is
/// propagated to every not-yet-visited input branch.
pub(crate) fn determine_live_registers(
    instructions: &mut [Instruction],
    exclude_parameter_loads: bool,
) -> Result<()> {
    let branches = input_branches(instructions)?;
    for instruction in instructions.iter_mut() {
        instruction.live_registers.clear();
    }
    let mut visited = vec![false; instructions.len()];
    let exit_points: Vec<usize> = instructions
        .iter()
        .enumerate()
        .filter(|(_, instruction)| {
            matches!(instruction.kind, InstructionKind::BranchExchange { .. })
        })
        .map(|(index, _)| index)
        .collect();
    for exit_point in exit_points {
        mark_live(
            instructions,
            &branches,
            &mut visited,
            exclude_parameter_loads,
            exit_point,
            HashMap::new(),
        );
    }
    Ok(())
}

fn mark_live(
    instructions: &mut [Instruction],
    branches: &HashMap<usize, Vec<usize>>,
    visited: &mut [bool],
    exclude_parameter_loads: bool,
    start: usize,
    initial: HashMap<u32, u64>,
) {
    let mut live = initial;
    for index in (0..=start).rev() {
        if index != start && instructions[index].kind.is_terminator() {
            return;
        }
        if instructions[index].kind.is_label() {
            if let Some(input_branches) = branches.get(&index) {
                for &branch in input_branches {
                    if !visited[branch] {
                        visited[branch] = true;
                        mark_live(
                            instructions,
                            branches,
                            visited,
                            exclude_parameter_loads,
                            branch,
                            live.clone(),
                        );
                    }
                }
            }
            continue;
        }

        let outputs = instructions[index].kind.output_registers();
        let inputs = if exclude_parameter_loads
            && matches!(instructions[index].kind, InstructionKind::LoadArgument { .. })
        {
            Vec::new()
        } else {
            instructions[index].kind.input_registers()
        };

        // Registers written here stop being live above; registers read
        // here become live.
        for output in outputs {
            if let Some(mask) = live.get_mut(&output.id()) {
                *mask &= !output.mask();
                if *mask == 0 {
                    live.remove(&output.id());
                }
            }
        }
        for input in inputs {
            *live.entry(input.id()).or_insert(0) |= input.mask();
        }

        // Merge with the live set recorded by earlier walks.
        for (&id, &mask) in &instructions[index].live_registers {
            *live.entry(id).or_insert(0) |= mask;
        }
        instructions[index].live_registers = live.clone();
    }
}
