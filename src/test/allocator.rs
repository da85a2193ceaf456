use crate::*;

#[test]
fn register_pressure_spills_into_callee_saved_registers() {
    let function = Function::declare("pressure", Microarchitecture::CortexM3, Abi::GnuEabiHf)
        .argument(Argument::pointer("input"))
        .argument(Argument::pointer("output"))
        .build(|b| {
            let arguments = b.load_arguments()?;
            let (input, output) = (arguments[0], arguments[1]);
            let mut values = Vec::new();
            for _ in 0..6 {
                let value = b.general_purpose_register();
                b.ldr(value, MemoryOperand::post_indexed(input, 4))?;
                values.push(value);
            }
            let result = b.general_purpose_register();
            b.mov(result, values[0])?;
            for value in &values[1..] {
                b.add(result, result, *value)?;
            }
            b.str_(result, MemoryOperand::register(output))?;
            b.ret()
        })
        .unwrap();
    let assembly = function.assembly();
    assert!(!assembly.contains("vreg"));
    // Six concurrently live values overflow the scratch registers, so
    // some callee-saved ones get written and preserved.
    assert!(assembly.contains("PUSH {"));
    assert!(assembly.contains("POP {"));
}

#[test]
fn neon_register_lists_are_contiguous_in_the_output() {
    let function = Function::declare("neon_copy", Microarchitecture::CortexA9, Abi::GnuEabiHf)
        .argument(Argument::pointer("input"))
        .argument(Argument::pointer("output"))
        .build(|b| {
            let arguments = b.load_arguments()?;
            let low = b.d_register();
            let high = b.d_register();
            b.vld1_32(&[low, high], MemoryOperand::register(arguments[0]))?;
            b.vst1_32(&[low, high], MemoryOperand::register(arguments[1]))?;
            b.ret()
        })
        .unwrap();
    let assembly = function.assembly();
    assert!(assembly.contains("VLD1.32 {d0, d1}"));
    assert!(assembly.contains("VST1.32 {d0, d1}"));
}

#[test]
fn vfp_multiple_loads_use_sequential_s_registers() {
    let function = Function::declare("vldm_sum", Microarchitecture::CortexM4, Abi::GnuEabiHf)
        .argument(Argument::pointer("input"))
        .argument(Argument::pointer("output"))
        .build(|b| {
            let arguments = b.load_arguments()?;
            let first = b.s_register();
            let second = b.s_register();
            b.vldm(arguments[0], &[first, second])?;
            b.vadd(first, first, second)?;
            b.vstr(first, MemoryOperand::register(arguments[1]))?;
            b.ret()
        })
        .unwrap();
    let assembly = function.assembly();
    assert!(assembly.contains("VLDM r0, {s0, s1}"));
    assert!(assembly.contains("VADD.F32 s0, s0, s1"));
}

#[test]
fn distinct_live_values_never_share_a_register() {
    let function = Function::declare("sum3", Microarchitecture::CortexM3, Abi::GnuEabiHf)
        .argument(Argument::uint32("a"))
        .argument(Argument::uint32("b"))
        .argument(Argument::uint32("c"))
        .build(|b| {
            let arguments = b.load_arguments()?;
            let total = b.general_purpose_register();
            b.add(total, arguments[0], arguments[1])?;
            b.add(total, total, arguments[2])?;
            b.str_(
                total,
                MemoryOperand::register(crate::registers::R0),
            )?;
            b.ret()
        })
        .unwrap();
    let assembly = function.assembly();
    // The three argument values stay in their distinct incoming
    // registers, so the first sum reads two different sources.
    assert!(assembly.contains("ADD"));
    assert!(!assembly.contains("vreg"));
}

#[test]
fn branchless_straight_line_code_reuses_dead_registers() {
    let function = Function::declare("chain", Microarchitecture::CortexM3, Abi::GnuEabiHf)
        .argument(Argument::uint32("seed"))
        .build(|b| {
            let arguments = b.load_arguments()?;
            let doubled = b.general_purpose_register();
            b.lsl(doubled, arguments[0], 1)?;
            let tripled = b.general_purpose_register();
            b.add(tripled, doubled, arguments[0])?;
            b.str_(
                tripled,
                MemoryOperand::register(crate::registers::R1),
            )?;
            b.ret()
        })
        .unwrap();
    assert!(!function.assembly().contains("vreg"));
}
