// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Cross-cutting assembler tests: full source programs in, byte-exact
//! images out.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use proptest::prelude::*;

use crate::assembler::{AssembleOptions, Assembler, IncludeResolver};
use crate::core::error::AsmErrorKind;
use crate::core::image::{Image, HEADER_SIZE};
use crate::core::opcode::{Arity, Opcode};
use crate::core::operand::{decode_operand, OperandType};

fn assemble(source: &str) -> Vec<u8> {
    Assembler::assemble_str(source, AssembleOptions::default()).expect("assembly succeeds")
}

/// Walk an image's code segment, returning `(offset, opcode)` pairs and
/// checking that every operand decodes.
fn walk_code(code: &[u8]) -> Vec<(usize, Opcode)> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < code.len() {
        let opcode = Opcode::from_byte(code[pos]).expect("valid opcode byte");
        out.push((pos, opcode));
        pos += 1;
        match opcode.arity() {
            Arity::Fixed(count) => {
                for _ in 0..count {
                    let (_, used) = decode_operand(code, pos).expect("operand decodes");
                    pos += used;
                }
            }
            Arity::Variadic => {
                let nul = code[pos..]
                    .iter()
                    .position(|&b| b == 0)
                    .expect("terminated name");
                pos += nul + 1;
                loop {
                    let (operand, used) = decode_operand(code, pos).expect("operand decodes");
                    pos += used;
                    if operand.otype == OperandType::None {
                        break;
                    }
                }
            }
            Arity::None => panic!("pseudo opcode {opcode:?} reached the code segment"),
        }
    }
    out
}

#[test]
fn hello_world_image_layout_is_byte_exact() {
    let image_bytes = assemble(
        "DB $0 \"Hi\"\n\
         LBL main\n\
         OUT 1 $0\n\
         HLT\n",
    );
    let image = Image::parse(&image_bytes).expect("image");

    // OUT 1 $0: opcode, imm(1) type+value, data(4) type+value. HLT: opcode.
    assert_eq!(
        image.code,
        &[
            Opcode::Out as u8,
            0x12,
            0x01,
            0x44,
            0x00,
            0x00,
            0x00,
            0x00,
            Opcode::Hlt as u8,
        ]
    );
    // Data record: addr 0, size 3, "Hi\0".
    assert_eq!(image.data, &[0x00, 0x00, 0x03, 0x00, b'H', b'i', 0x00]);
    assert_eq!(image.header.entry_offset(), 0);
    assert!(image.header.auto_init_frame());
    assert_eq!(image_bytes.len(), HEADER_SIZE + 9 + 7);
}

#[test]
fn every_operand_surface_form_assembles_and_decodes() {
    let image_bytes = assemble(
        "LBL main\n\
         MOV RAX 5\n\
         MOV R15 -300\n\
         MOV RBX $200\n\
         MOV $RBX 70000\n\
         MOV RCX $[RAX+8]\n\
         MOV RDX $[RAX+RBX]\n\
         JMP #main\n",
    );
    let image = Image::parse(&image_bytes).expect("image");
    let opcodes: Vec<Opcode> = walk_code(image.code)
        .into_iter()
        .map(|(_, opcode)| opcode)
        .collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::Mov,
            Opcode::Mov,
            Opcode::Mov,
            Opcode::Mov,
            Opcode::Mov,
            Opcode::Mov,
            Opcode::Jmp,
        ]
    );
}

#[test]
fn immediate_widths_shrink_to_fit() {
    let image_bytes = assemble(
        "LBL main\n\
         PUSH 5\n\
         PUSH 300\n\
         PUSH 70000\n\
         HLT\n",
    );
    let image = Image::parse(&image_bytes).expect("image");
    // PUSH with widths 1, 2 and 4: sizes 3, 4 and 6, plus HLT.
    assert_eq!(image.header.code_size, 3 + 4 + 6 + 1);
    assert_eq!(image.code[1], 0x12);
    assert_eq!(image.code[4], 0x22);
    assert_eq!(image.code[9], 0x42);
}

#[test]
fn mnemonics_are_case_insensitive_labels_are_not() {
    let image_bytes = assemble(
        "lbl main\n\
         mov rax 1\n\
         Jmp #end\n\
         LBL end\n\
         hlt\n",
    );
    Image::parse(&image_bytes).expect("image");

    let err = Assembler::assemble_str(
        "LBL Main\nHLT\n",
        AssembleOptions::default(),
    )
    .expect_err("label case must match");
    assert_eq!(err.kind(), AsmErrorKind::MissingEntryPoint);
}

#[test]
fn redefined_labels_keep_the_last_address() {
    let mut assembler = Assembler::new(AssembleOptions::default());
    assembler
        .parse_source("LBL main\nHLT\nLBL main\nHLT\n")
        .expect("parse");
    assert_eq!(assembler.labels().get("#main"), Some(&1));
}

#[test]
fn errors_carry_line_and_source_context() {
    let err = Assembler::assemble_str(
        "LBL main\n\
         MOV RAX 1\n\
         MOV RAX $[RAX%2]\n",
        AssembleOptions::default(),
    )
    .expect_err("bad expression");
    assert_eq!(err.line(), 3);
    assert_eq!(err.kind(), AsmErrorKind::InvalidOperand);
    let rendered = err.format_with_context();
    assert!(rendered.contains("MOV RAX $[RAX%2]"));
}

#[test]
fn mni_arguments_may_mix_every_operand_kind() {
    let image_bytes = assemble(
        "DB $0 \"x\"\n\
         LBL main\n\
         MNI Custom.call RAX 7 $0 $RBX $[RAX+2]\n\
         HLT\n",
    );
    let image = Image::parse(&image_bytes).expect("image");
    let walked = walk_code(image.code);
    assert_eq!(walked[0].1, Opcode::Mni);
    assert_eq!(walked[1].1, Opcode::Hlt);
}

#[test]
fn getarg_and_heap_opcodes_encode_with_two_operands() {
    let image_bytes = assemble(
        "LBL main\n\
         ARGC R0\n\
         GETARG R1 0\n\
         MALLOC R2 16\n\
         FREE R3 R2\n\
         HLT\n",
    );
    let image = Image::parse(&image_bytes).expect("image");
    let opcodes: Vec<Opcode> = walk_code(image.code)
        .into_iter()
        .map(|(_, opcode)| opcode)
        .collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::Argc,
            Opcode::Getarg,
            Opcode::Malloc,
            Opcode::Free,
            Opcode::Hlt,
        ]
    );
}

#[test]
fn block_memory_opcodes_take_three_operands() {
    let err = Assembler::assemble_str(
        "LBL main\nCOPY $0 $1\n",
        AssembleOptions::default(),
    )
    .expect_err("missing length");
    assert_eq!(err.kind(), AsmErrorKind::InvalidOperand);
    assert!(err.message().contains("COPY expects 3 operands"));

    assemble("LBL main\nCOPY $0 $64 16\nFILL $0 0 16\nCMP_MEM $0 $64 16\nHLT\n");
}

#[test]
fn empty_programs_still_need_an_entry_point() {
    let err =
        Assembler::assemble_str("; nothing here\n", AssembleOptions::default()).expect_err("empty");
    assert_eq!(err.kind(), AsmErrorKind::MissingEntryPoint);
}

#[test]
fn data_records_advance_independently_of_code_addresses() {
    let mut assembler = Assembler::new(AssembleOptions::default());
    assembler
        .parse_source(
            "DB $0 \"one\"\n\
             LBL main\n\
             DB $16 \"two\"\n\
             HLT\n",
        )
        .expect("parse");
    // DB lines do not advance the code cursor: #main sits at 0.
    assert_eq!(assembler.labels().get("#main"), Some(&0));
    let image_bytes = assembler.emit().expect("emit");
    let image = Image::parse(&image_bytes).expect("image");
    assert_eq!(image.header.code_size, 1);
    let records: Vec<_> = image
        .data_records()
        .collect::<Result<Vec<_>, _>>()
        .expect("records");
    assert_eq!(records.len(), 2);
}

mod includes {
    use super::*;

    static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn scratch_dir(tag: &str) -> PathBuf {
        let counter = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "masmforge-asm-{tag}-{}-{counter}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn nested_includes_splice_in_order() {
        let dir = scratch_dir("nested");
        fs::write(dir.join("inner.mas"), "LBL inner\nRET\n").expect("write inner");
        fs::write(
            dir.join("outer.mas"),
            "#include \"./inner\"\nLBL outer\nRET\n",
        )
        .expect("write outer");
        fs::write(
            dir.join("main.masm"),
            "#include \"./outer\"\nLBL main\nCALL #inner\nCALL #outer\nHLT\n",
        )
        .expect("write main");

        let image_bytes =
            Assembler::assemble_file(&dir.join("main.masm"), AssembleOptions::default())
                .expect("assemble");
        let image = Image::parse(&image_bytes).expect("image");
        // inner RET at 0, outer RET at 1, main starts at 2.
        assert_eq!(image.header.entry_offset(), 2);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn include_cycles_terminate_on_the_second_visit() {
        let dir = scratch_dir("cycle");
        fs::write(
            dir.join("a.mas"),
            "#include \"./b\"\nLBL in_a\nRET\n",
        )
        .expect("write a");
        fs::write(
            dir.join("b.mas"),
            "#include \"./a\"\nLBL in_b\nRET\n",
        )
        .expect("write b");
        fs::write(
            dir.join("main.masm"),
            "#include \"./a\"\nLBL main\nCALL #in_a\nCALL #in_b\nHLT\n",
        )
        .expect("write main");

        let image_bytes =
            Assembler::assemble_file(&dir.join("main.masm"), AssembleOptions::default())
                .expect("cycle assembles");
        Image::parse(&image_bytes).expect("image");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn dotted_stdlib_includes_resolve_through_the_custom_root() {
        let dir = scratch_dir("root");
        fs::create_dir_all(dir.join("text")).expect("mkdir");
        fs::write(dir.join("text/util.masm"), "LBL put\nRET\n").expect("write lib");

        let mut assembler = Assembler::new(AssembleOptions::default())
            .with_includes(IncludeResolver::with_stdlib_root(&dir));
        assembler
            .parse_source("#include \"text.util\"\nLBL main\nCALL #put\nHLT\n")
            .expect("parse with stdlib include");
        let image_bytes = assembler.emit().expect("emit");
        let image = Image::parse(&image_bytes).expect("image");
        assert_eq!(image.header.entry_offset(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_includes_fail_with_every_candidate_listed() {
        let mut assembler = Assembler::new(AssembleOptions::default())
            .with_includes(IncludeResolver::with_stdlib_root("/nonexistent-root"));
        let err = assembler
            .parse_source("#include \"no.such.lib\"\nLBL main\nHLT\n")
            .expect_err("missing include");
        assert_eq!(err.kind(), AsmErrorKind::IncludeNotFound);
        assert_eq!(err.line(), 1);
        assert!(err.message().contains("no.such.lib"));
    }

    #[test]
    fn errors_in_included_files_name_the_inner_file() {
        let dir = scratch_dir("inner-error");
        fs::write(dir.join("broken.mas"), "LBL x\nBOGUS RAX\n").expect("write broken");
        fs::write(
            dir.join("main.masm"),
            "#include \"./broken\"\nLBL main\nHLT\n",
        )
        .expect("write main");

        let err = Assembler::assemble_file(&dir.join("main.masm"), AssembleOptions::default())
            .expect_err("inner error");
        assert_eq!(err.kind(), AsmErrorKind::UnknownOpcode);
        assert_eq!(err.line(), 2);
        assert!(err.file().expect("file recorded").contains("broken"));
        fs::remove_dir_all(&dir).ok();
    }
}

/// Source fragments whose operands cover every addressing form, used to
/// drive generated programs.
fn instruction_pool() -> Vec<&'static str> {
    vec![
        "MOV RAX 1",
        "MOV R12 -129",
        "MOV RBX $64",
        "MOVB RCX $RBX",
        "ADD RAX RBX",
        "SUB RAX 70000",
        "MUL RAX 3",
        "INC R5",
        "NOT R5",
        "AND RAX 255",
        "SHL RAX 1",
        "CMP RAX RBX",
        "PUSH RAX",
        "POP RBX",
        "ENTER 8",
        "LEAVE",
        "ENTER",
        "OUT 1 RAX",
        "COUT 2 10",
        "MOV RDX $[RAX+12]",
        "MOV RSI $[RBP-4]",
        "MOV RDI $[RAX+RBX]",
        "COPY $0 $64 8",
        "FILL $0 0 8",
        "CMP_MEM $0 $64 8",
        "MALLOC R0 24",
        "FREE R1 R0",
        "ARGC R2",
        "MNI Math.sin RAX RBX",
    ]
}

proptest! {
    /// The pre-pass size sum must equal the emitted code size for any
    /// program drawn from the instruction pool.
    #[test]
    fn emitted_code_size_matches_the_sizing_pass(
        picks in proptest::collection::vec(0usize..29, 1..40)
    ) {
        let pool = instruction_pool();
        let mut source = String::from("LBL main\n");
        for pick in picks {
            source.push_str(pool[pick]);
            source.push('\n');
        }
        source.push_str("HLT\n");

        let image_bytes = Assembler::assemble_str(&source, AssembleOptions::default())
            .expect("assembly succeeds");
        let image = Image::parse(&image_bytes).expect("image");
        prop_assert_eq!(image.code.len(), image.header.code_size as usize);

        // Decoding the whole segment consumes exactly code_size bytes and
        // ends on an instruction boundary.
        let walked = walk_code(image.code);
        prop_assert!(!walked.is_empty());
        prop_assert_eq!(walked.last().expect("at least HLT").1, Opcode::Hlt);
    }

    /// Label operands always point at instruction boundaries.
    #[test]
    fn label_operands_land_on_instruction_starts(
        picks in proptest::collection::vec(0usize..29, 0..12)
    ) {
        let pool = instruction_pool();
        let mut source = String::from("LBL main\n");
        for pick in &picks {
            source.push_str(pool[*pick]);
            source.push('\n');
        }
        source.push_str("LBL tail\nJMP #tail\nCMP RAX 1\nJE #main\nCALL #tail\nHLT\n");

        let image_bytes = Assembler::assemble_str(&source, AssembleOptions::default())
            .expect("assembly succeeds");
        let image = Image::parse(&image_bytes).expect("image");
        let starts: Vec<usize> = walk_code(image.code)
            .into_iter()
            .map(|(offset, _)| offset)
            .collect();

        let mut pos = 0usize;
        let mut targets = Vec::new();
        while pos < image.code.len() {
            let opcode = Opcode::from_byte(image.code[pos]).expect("opcode");
            pos += 1;
            let count = match opcode.arity() {
                Arity::Fixed(count) => count,
                Arity::Variadic => {
                    let nul = image.code[pos..].iter().position(|&b| b == 0).expect("name");
                    pos += nul + 1;
                    loop {
                        let (operand, used) = decode_operand(image.code, pos).expect("operand");
                        pos += used;
                        if operand.otype == OperandType::None {
                            break;
                        }
                    }
                    continue;
                }
                Arity::None => unreachable!(),
            };
            for _ in 0..count {
                let (operand, used) = decode_operand(image.code, pos).expect("operand");
                if operand.otype == OperandType::LabelAddress {
                    targets.push(operand.value as usize);
                }
                pos += used;
            }
        }
        for target in targets {
            prop_assert!(starts.contains(&target), "target {} not a boundary", target);
        }
    }
}

#[test]
fn labels_resolve_against_a_prebuilt_table() {
    let mut labels = HashMap::new();
    labels.insert("#lib".to_string(), 40u32);
    let operand = crate::assembler::resolve_operand("#lib", &labels).expect("resolve");
    assert_eq!(operand.otype, OperandType::LabelAddress);
    assert_eq!(operand.value, 40);
}
