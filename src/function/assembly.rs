use crate::function::Function;
use crate::instructions::InstructionKind;
use crate::isa::{Extension, Extensions};
use crate::registers::RegisterKind;

/// Union of the target's extensions, the per-instruction requirements and
/// VFPd32 whenever the upper register file is touched.
fn function_isa_extensions(function: &Function) -> Extensions {
    let mut extensions = function.target.extensions();
    for instruction in &function.instructions {
        extensions = extensions.union(instruction.kind.isa_extensions());
        let touches_upper_bank = instruction.kind.registers().iter().any(|register| {
            !register.is_virtual()
                && (register.kind() == RegisterKind::Q
                    || (register.kind() == RegisterKind::D && register.physical_number() >= 16))
        });
        if touches_upper_bank {
            extensions.insert(Extension::VfpD32);
        }
    }
    extensions
}

fn gas_arch_spec(extensions: Extensions) -> &'static str {
    if extensions.contains(Extension::Div) {
        ".cpu cortex-a15"
    } else if extensions.contains(Extension::V7MP) {
        ".cpu cortex-a9"
    } else if extensions.contains(Extension::V7M) {
        ".arch armv7-m"
    } else if extensions.contains(Extension::V7) {
        ".arch armv7-a"
    } else if extensions.contains(Extension::V6K) {
        ".arch armv6zk"
    } else if extensions.contains(Extension::V6) {
        ".arch armv6"
    } else if extensions.contains(Extension::V5E) {
        ".arch armv5te"
    } else {
        ".arch armv5t"
    }
}

fn gas_fpu_spec(extensions: Extensions) -> Option<&'static str> {
    let has = |extension| extensions.contains(extension);
    if has(Extension::Neon2) || has(Extension::Vfp4) {
        Some(".fpu neon-vfpv4")
    } else if has(Extension::NeonHp) || (has(Extension::VfpHp) && has(Extension::Neon)) {
        Some(".fpu neon-fp16")
    } else if has(Extension::Neon) {
        Some(".fpu neon")
    } else if has(Extension::VfpHp) {
        if has(Extension::VfpD32) {
            Some(".fpu vfpv3-fp16")
        } else {
            Some(".fpu vfpv3-d16-fp16")
        }
    } else if has(Extension::Vfp3) {
        if has(Extension::VfpD32) {
            Some(".fpu vfpv3")
        } else {
            Some(".fpu vfpv3-d16")
        }
    } else if has(Extension::Vfp) || has(Extension::Vfp2) {
        Some(".fpu vfp")
    } else {
        None
    }
}

fn armcc_fpu_spec(extensions: Extensions) -> Option<&'static str> {
    let has = |extension| extensions.contains(extension);
    if has(Extension::Neon2) || has(Extension::Vfp4) {
        Some("REQUIRE VFPv4")
    } else if has(Extension::NeonHp) || (has(Extension::VfpHp) && has(Extension::Neon)) {
        Some("REQUIRE VFPv3_FP16")
    } else if has(Extension::Neon) {
        Some("REQUIRE VFPv3")
    } else if has(Extension::VfpHp) {
        Some("REQUIRE VFPv3_FP16")
    } else if has(Extension::Vfp3) {
        Some("REQUIRE VFPv3")
    } else if has(Extension::Vfp) || has(Extension::Vfp2) {
        Some("REQUIRE VFPv2")
    } else {
        None
    }
}

fn gas_data_directive(size: u32) -> &'static str {
    match size {
        8 => ".byte",
        16 => ".hword",
        32 => ".word",
        64 => ".quad",
        _ => ".octa",
    }
}

fn armcc_data_directive(size: u32) -> &'static str {
    match size {
        8 => "DCB",
        16 => "DCW",
        32 => "DCD",
        _ => "DCDU",
    }
}

pub(crate) fn generate_gas(function: &Function) -> String {
    let extensions = function_isa_extensions(function);
    let mut assembly = String::new();
    assembly.push_str("\t.syntax unified\n");
    if function.is_thumb {
        assembly.push_str("\t.thumb\n");
    }
    assembly.push_str("\t");
    assembly.push_str(gas_arch_spec(extensions));
    assembly.push('\n');

    if !function.constants.is_empty() {
        assembly.push_str(&format!("\t.section .rodata.{}\n", function.target.id()));
        let max_alignment = function
            .constants
            .first()
            .map(|bucket| bucket.capacity())
            .unwrap_or(4);
        assembly.push_str(&format!("\t.balign {}\n", max_alignment));
        assembly.push_str(&format!("{}_constants:\n", function.name));
        let mut need_alignment = false;
        for bucket in &function.constants {
            if need_alignment {
                assembly.push_str(&format!("\t.balign {}\n", bucket.capacity()));
            }
            for constant in &bucket.constants {
                assembly.push_str(&format!(
                    "{}: {} {}\n",
                    constant.label().unwrap_or(""),
                    gas_data_directive(constant.size()),
                    constant.value_text()
                ));
            }
            need_alignment = !bucket.is_full();
        }
        assembly.push('\n');
    }

    assembly.push_str("\n\t.text\n");
    assembly.push_str(&format!(".global {}\n", function.name));
    assembly.push_str(&format!(".type {}, %function\n", function.name));
    if function.alignment > 0 {
        assembly.push_str(&format!(".align {}\n", function.alignment));
    }
    assembly.push_str(&format!("{}:\n", function.name));
    if let Some(fpu) = gas_fpu_spec(extensions) {
        assembly.push_str("\t");
        assembly.push_str(fpu);
        assembly.push('\n');
    }

    for instruction in &function.instructions {
        match &instruction.kind {
            InstructionKind::Branch { target, .. } => {
                assembly.push_str(&format!(
                    "\t{} L{}.{}\n",
                    instruction.kind.mnemonic(),
                    function.name,
                    target
                ));
            }
            InstructionKind::Label { name } => {
                assembly.push_str(&format!("L{}.{}:\n", function.name, name));
            }
            kind => {
                assembly.push_str(&format!("\t{}\n", kind));
            }
        }
    }
    assembly.push('\n');
    assembly
}

/// ARMCC rejects dots in symbols, so label names are flattened with
/// underscores and prefixed by the function name.
fn armcc_label(function_name: &str, label: &str) -> String {
    format!("{}_{}", function_name, label.replace('.', "_"))
}

pub(crate) fn generate_armcc(function: &Function) -> String {
    let extensions = function_isa_extensions(function);
    let mut assembly = String::new();
    if function.is_thumb {
        assembly.push_str("        THUMB\n");
    }

    if !function.constants.is_empty() {
        assembly.push_str("        AREA    ||.constdata||, DATA, READONLY\n");
        assembly.push_str(&format!("{}_constants\n", function.name));
        for bucket in &function.constants {
            for constant in &bucket.constants {
                assembly.push_str(&format!(
                    "{}    {}    {}\n",
                    constant.label().unwrap_or(""),
                    armcc_data_directive(constant.size()),
                    constant.value_text()
                ));
            }
        }
        assembly.push('\n');
    }

    assembly.push_str("        AREA    ||.text||, CODE, READONLY");
    if function.alignment > 0 {
        assembly.push_str(&format!(", ALIGN={}", function.alignment));
    }
    assembly.push('\n');
    if function.preserve8 {
        assembly.push_str("        PRESERVE8\n");
    }
    if let Some(fpu) = armcc_fpu_spec(extensions) {
        assembly.push_str("        ");
        assembly.push_str(fpu);
        assembly.push('\n');
    }
    assembly.push('\n');

    if !function.external_functions.is_empty() {
        for name in &function.external_functions {
            assembly.push_str(&format!("        IMPORT  {}\n", name));
        }
        assembly.push('\n');
    }

    assembly.push_str(&format!("{}    PROC\n", function.name));
    assembly.push_str(&format!("        EXPORT  {}\n", function.name));

    for instruction in &function.instructions {
        match &instruction.kind {
            InstructionKind::Branch { target, .. } => {
                assembly.push_str(&format!(
                    "        {} {}\n",
                    instruction.kind.mnemonic(),
                    armcc_label(&function.name, target)
                ));
            }
            InstructionKind::Label { name } => {
                assembly.push_str(&format!("{}\n", armcc_label(&function.name, name)));
            }
            kind => {
                assembly.push_str(&format!("        {}\n", kind));
            }
        }
    }

    assembly.push_str("        ENDP\n");
    assembly.push_str("        END\n");
    assembly
}
