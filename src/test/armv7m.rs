use crate::registers::{R4, R5, R8};
use crate::*;

fn writes_registers(
    target: Microarchitecture,
    format: AssemblyFormat,
    strategy: HighRegisterStrategy,
    registers: &[Register],
) -> Function {
    let registers = registers.to_vec();
    Function::declare("preserve", target, Abi::GnuEabi)
        .assembly_format(format)
        .high_register_strategy(strategy)
        .build(move |b| {
            for register in &registers {
                b.mov(*register, 1)?;
            }
            b.ret()
        })
        .unwrap()
}

#[test]
fn low_only_prologue_is_padded_to_eight_bytes() {
    let function = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Gas,
        HighRegisterStrategy::Auto,
        &[R4],
    );
    let assembly = function.assembly();
    assert!(assembly.contains("\tPUSH {r3, r4}\n"));
    assert!(assembly.contains("\tPOP {r3, r4}\n"));
}

#[test]
fn even_low_sets_are_not_padded() {
    let function = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Gas,
        HighRegisterStrategy::Auto,
        &[R4, R5],
    );
    let assembly = function.assembly();
    assert!(assembly.contains("\tPUSH {r4, r5}\n"));
    assert!(!assembly.contains("r3"));
}

#[test]
fn auto_strategy_uses_push_w_under_gas() {
    let function = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Gas,
        HighRegisterStrategy::Auto,
        &[R8],
    );
    let assembly = function.assembly();
    assert!(assembly.contains("\tPUSH.W {r8}\n"));
    assert!(assembly.contains("\tPOP.W {r8}\n"));
}

#[test]
fn auto_strategy_uses_stmdb_under_armcc() {
    let function = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Armcc,
        HighRegisterStrategy::Auto,
        &[R8],
    );
    let assembly = function.assembly();
    assert!(assembly.contains("        STMDB sp!, {r8}\n"));
    assert!(assembly.contains("        LDMIA sp!, {r8}\n"));
}

#[test]
fn explicit_strategies_override_the_dialect() {
    let stmdb_under_gas = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Gas,
        HighRegisterStrategy::Stmdb,
        &[R8],
    );
    assert!(stmdb_under_gas.assembly().contains("\tSTMDB sp!, {r8}\n"));

    let push_w_under_armcc = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Armcc,
        HighRegisterStrategy::PushW,
        &[R8],
    );
    let assembly = push_w_under_armcc.assembly();
    assert!(assembly.contains("        PUSH.W {r8}\n"));
    assert!(assembly.contains("        POP.W {r8}\n"));
}

#[test]
fn auto_matches_the_explicit_choice() {
    let auto = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Gas,
        HighRegisterStrategy::Auto,
        &[R8],
    );
    let explicit = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Gas,
        HighRegisterStrategy::PushW,
        &[R8],
    );
    assert_eq!(auto.assembly(), explicit.assembly());
}

#[test]
fn mixed_sets_save_low_then_high_and_restore_in_reverse() {
    let function = writes_registers(
        Microarchitecture::CortexM4,
        AssemblyFormat::Gas,
        HighRegisterStrategy::Auto,
        &[R4, R8],
    );
    let assembly = function.assembly();
    let push_low = assembly.find("PUSH {r3, r4}").unwrap();
    let push_high = assembly.find("PUSH.W {r8}").unwrap();
    let pop_high = assembly.find("POP.W {r8}").unwrap();
    let pop_low = assembly.find("POP {r3, r4}").unwrap();
    assert!(push_low < push_high);
    assert!(push_high < pop_high);
    assert!(pop_high < pop_low);
}

#[test]
fn functions_without_callee_saved_writes_have_no_prologue() {
    let function = Function::declare("leaf", Microarchitecture::CortexM4, Abi::GnuEabi)
        .build(|b| {
            b.mov(crate::registers::R0, 1)?;
            b.ret()
        })
        .unwrap();
    let assembly = function.assembly();
    assert!(!assembly.contains("PUSH"));
    assert!(!assembly.contains("POP"));
    assert!(!assembly.contains("VPUSH"));
}

#[test]
fn callee_saved_d_registers_use_vpush_and_vpop() {
    let function = Function::declare("vfp", Microarchitecture::CortexM4, Abi::GnuEabiHf)
        .build(|b| {
            b.vmov(Register::d(8), Register::d(0))?;
            b.ret()
        })
        .unwrap();
    let assembly = function.assembly();
    let vpush = assembly.find("\tVPUSH {d8}\n").unwrap();
    let vpop = assembly.find("\tVPOP {d8}\n").unwrap();
    assert!(vpush < vpop);
}

#[test]
fn non_v7m_targets_push_one_combined_list() {
    let function = writes_registers(
        Microarchitecture::CortexA9,
        AssemblyFormat::Gas,
        HighRegisterStrategy::Auto,
        &[R4, R8],
    );
    let assembly = function.assembly();
    assert!(assembly.contains("\tPUSH {r4, r8}\n"));
    assert!(assembly.contains("\tPOP {r4, r8}\n"));
    assert!(!assembly.contains("PUSH.W"));
}
