use crate::*;

mod allocator;
mod armv7m;

/// Copies one word from the first pointer argument to the second.
pub(crate) fn simple_copy(
    target: Microarchitecture,
    abi: Abi,
    format: AssemblyFormat,
) -> Function {
    Function::declare("simple_copy", target, abi)
        .argument(Argument::pointer("input"))
        .argument(Argument::pointer("output"))
        .assembly_format(format)
        .build(|b| {
            let arguments = b.load_arguments()?;
            let value = b.general_purpose_register();
            b.ldr(value, MemoryOperand::register(arguments[0]))?;
            b.str_(value, MemoryOperand::register(arguments[1]))?;
            b.ret()
        })
        .expect("build failed")
}

#[test]
fn gas_output_structure() {
    let function = simple_copy(
        Microarchitecture::CortexM3,
        Abi::GnuEabiHf,
        AssemblyFormat::Gas,
    );
    let assembly = function.assembly();
    assert!(assembly.contains("\t.syntax unified\n"));
    assert!(assembly.contains("\t.arch armv7-m\n"));
    assert!(assembly.contains(".global simple_copy\n"));
    assert!(assembly.contains(".type simple_copy, %function\n"));
    assert!(assembly.contains("simple_copy:\n"));
    assert!(assembly.contains("\tBX lr\n"));
}

#[test]
fn armcc_output_structure() {
    let function = simple_copy(
        Microarchitecture::CortexM3,
        Abi::GnuEabiHf,
        AssemblyFormat::Armcc,
    );
    let assembly = function.assembly();
    assert!(assembly.contains("        AREA    ||.text||, CODE, READONLY\n"));
    assert!(assembly.contains("simple_copy    PROC\n"));
    assert!(assembly.contains("        EXPORT  simple_copy\n"));
    assert!(assembly.contains("        ENDP\n"));
    assert!(assembly.contains("        END\n"));
}

#[test]
fn cortex_a_targets_use_cpu_directives() {
    let a9 = simple_copy(
        Microarchitecture::CortexA9,
        Abi::GnuEabiHf,
        AssemblyFormat::Gas,
    );
    assert!(a9.assembly().contains("\t.cpu cortex-a9\n"));
    let a15 = simple_copy(
        Microarchitecture::CortexA15,
        Abi::GnuEabiHf,
        AssemblyFormat::Gas,
    );
    assert!(a15.assembly().contains("\t.cpu cortex-a15\n"));
}

#[test]
fn cortex_m4_reports_an_fpu() {
    let function = simple_copy(
        Microarchitecture::CortexM4,
        Abi::GnuEabiHf,
        AssemblyFormat::Gas,
    );
    assert!(function.assembly().contains("\t.fpu "));
}

#[test]
fn thumb_directives_follow_the_dialect() {
    let gas = Function::declare("t", Microarchitecture::CortexM4, Abi::GnuEabi)
        .thumb(true)
        .build(|b| b.ret())
        .unwrap();
    assert!(gas.assembly().contains("\t.thumb\n"));

    let armcc = Function::declare("t", Microarchitecture::CortexM4, Abi::GnuEabi)
        .thumb(true)
        .assembly_format(AssemblyFormat::Armcc)
        .preserve8(true)
        .build(|b| b.ret())
        .unwrap();
    let assembly = armcc.assembly();
    assert!(assembly.contains("        THUMB\n"));
    assert!(assembly.contains("        PRESERVE8\n"));
}

#[test]
fn alignment_is_forwarded_to_the_directives() {
    let gas = Function::declare("aligned", Microarchitecture::CortexM4, Abi::GnuEabi)
        .alignment(2)
        .build(|b| b.ret())
        .unwrap();
    assert!(gas.assembly().contains(".align 2\n"));

    let armcc = Function::declare("aligned", Microarchitecture::CortexM4, Abi::GnuEabi)
        .alignment(2)
        .assembly_format(AssemblyFormat::Armcc)
        .build(|b| b.ret())
        .unwrap();
    assert!(armcc
        .assembly()
        .contains("AREA    ||.text||, CODE, READONLY, ALIGN=2\n"));
}

#[test]
fn nested_builds_are_rejected() {
    let function = Function::declare("outer", Microarchitecture::CortexM3, Abi::GnuEabi)
        .build(|b| {
            let inner = Function::declare("inner", Microarchitecture::CortexM3, Abi::GnuEabi)
                .build(|b| b.ret());
            match inner {
                Err(Error::NestedBuild { active }) => assert_eq!(active, "outer"),
                other => panic!("expected NestedBuild, got {:?}", other.map(|_| ())),
            }
            b.ret()
        })
        .unwrap();
    assert!(function.assembly().contains("BX lr"));

    // The slot is released again, so a sequential build works.
    Function::declare("after", Microarchitecture::CortexM3, Abi::GnuEabi)
        .build(|b| b.ret())
        .unwrap();
}

#[test]
fn isa_mismatch_is_rejected_at_emit_time() {
    Function::declare("div", Microarchitecture::CortexA9, Abi::GnuEabi)
        .build(|b| {
            let value = b.general_purpose_register();
            let error = b.sdiv(value, value, value).unwrap_err();
            matches::assert_matches!(
                error,
                Error::UnsupportedIsa {
                    extension: Extension::Div,
                    ..
                }
            );
            b.ret()
        })
        .unwrap();

    Function::declare("neon", Microarchitecture::CortexM4, Abi::GnuEabi)
        .build(|b| {
            let d = b.d_register();
            let error = b
                .vld1_32(&[d], MemoryOperand::register(registers::R0))
                .unwrap_err();
            matches::assert_matches!(
                error,
                Error::UnsupportedIsa {
                    extension: Extension::Neon,
                    ..
                }
            );
            b.ret()
        })
        .unwrap();
}

#[test]
fn argument_loads_into_hinted_registers_are_elided() {
    let function = simple_copy(
        Microarchitecture::CortexM3,
        Abi::GnuEabiHf,
        AssemblyFormat::Gas,
    );
    let assembly = function.assembly();
    // Both pointers keep their argument registers, so no moves remain and
    // the first load reads through r0 directly.
    assert!(!assembly.contains("MOV"));
    assert!(assembly.contains("[r0]"));
    assert!(assembly.contains("[r1]"));
}

#[test]
fn no_virtual_registers_survive_allocation() {
    let function = simple_copy(
        Microarchitecture::CortexM3,
        Abi::GnuEabiHf,
        AssemblyFormat::Gas,
    );
    assert!(!function.assembly().contains("vreg"));
}

#[test]
fn branch_labels_follow_the_dialect() {
    for format in [AssemblyFormat::Gas, AssemblyFormat::Armcc].iter() {
        let function = Function::declare("f", Microarchitecture::CortexM3, Abi::GnuEabi)
            .argument(Argument::size_t("count"))
            .assembly_format(*format)
            .build(|b| {
                let arguments = b.load_arguments()?;
                let count = arguments[0];
                let looped = b.begin_loop("loop")?;
                b.subs(count, count, 1)?;
                b.bne(looped.begin())?;
                b.end_loop(&looped)?;
                b.ret()
            })
            .unwrap();
        let assembly = function.assembly();
        match format {
            AssemblyFormat::Gas => {
                assert!(assembly.contains("Lf.loop.begin:\n"));
                assert!(assembly.contains("\tBNE Lf.loop.begin\n"));
            }
            AssemblyFormat::Armcc => {
                assert!(assembly.contains("f_loop_begin\n"));
                assert!(assembly.contains("        BNE f_loop_begin\n"));
                assert!(!assembly.contains("f_loop.begin"));
            }
        }
    }
}

#[test]
fn armcc_imports_external_functions_sorted() {
    let function = Function::declare("caller", Microarchitecture::CortexM4, Abi::GnuEabi)
        .assembly_format(AssemblyFormat::Armcc)
        .build(|b| {
            let zebra = b.import_function("zebra");
            let apple = b.import_function("apple");
            let apple_again = b.import_function("apple");
            assert_eq!(apple, apple_again);
            b.push(&[registers::R4, registers::R5])?;
            b.bl(&apple)?;
            b.bl(&zebra)?;
            b.pop(&[registers::R4, registers::R5])?;
            b.ret()
        })
        .unwrap();
    let assembly = function.assembly();
    let apple_at = assembly.find("IMPORT  apple").unwrap();
    let zebra_at = assembly.find("IMPORT  zebra").unwrap();
    assert!(apple_at < zebra_at);
    assert_eq!(assembly.matches("IMPORT  apple").count(), 1);

    // GAS has no import directives; the call site names the symbol.
    let gas = Function::declare("caller", Microarchitecture::CortexM4, Abi::GnuEabi)
        .build(|b| {
            let apple = b.import_function("apple");
            b.push(&[registers::R4, registers::R5])?;
            b.bl(&apple)?;
            b.pop(&[registers::R4, registers::R5])?;
            b.ret()
        })
        .unwrap();
    assert!(gas.assembly().contains("\tBL apple\n"));
    assert!(!gas.assembly().contains("IMPORT"));
}

#[test]
fn branches_to_unknown_labels_fail() {
    let result = Function::declare("bad_branch", Microarchitecture::CortexM3, Abi::GnuEabi)
        .build(|b| {
            b.b("nowhere")?;
            b.ret()
        });
    match result.err() {
        Some(Error::UnknownLabel { label }) => assert_eq!(label, "nowhere"),
        other => panic!("expected UnknownLabel, got {:?}", other),
    }
}

#[test]
fn arguments_are_found_by_name() {
    let function = simple_copy(
        Microarchitecture::CortexM3,
        Abi::GnuEabiHf,
        AssemblyFormat::Gas,
    );
    assert!(function.argument("input").is_some());
    assert!(function.argument("output").is_some());
    assert!(function.argument("missing").is_none());
}

#[test]
fn same_register_moves_are_dropped() {
    let function = Function::declare("noop_moves", Microarchitecture::CortexM4, Abi::GnuEabi)
        .build(|b| {
            b.mov(registers::R0, registers::R0)?;
            b.vmov(Register::d(0), Register::d(0))?;
            b.mov(registers::R0, registers::R1)?;
            b.ret()
        })
        .unwrap();
    let assembly = function.assembly();
    assert!(!assembly.contains("MOV r0, r0"));
    assert!(!assembly.contains("VMOV d0, d0"));
    assert!(assembly.contains("MOV r0, r1"));
}
