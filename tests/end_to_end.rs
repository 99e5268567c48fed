//! End-to-end tests driving the full scrub -> reader -> layout -> Mach-O
//! pipeline on small sources and inspecting the emitted object bytes.

use std::io::Write as _;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use object::{Object, ObjectSection, ObjectSymbol};

use mach_as::driver::{Driver, DriverConfig};
use mach_as::isa::ppc::PpcIsa;

fn write_temp_source(name: &str, body: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("mach_as_{name}_{}_{n}.s", std::process::id()));
    let mut f = std::fs::File::create(&path).expect("create temp source");
    f.write_all(body.as_bytes()).expect("write temp source");
    path
}

fn default_config() -> DriverConfig {
    DriverConfig {
        search_dirs: vec![],
        dynamic: false,
        start_in_text: true,
        subsections_via_symbols: true,
        emit_dwarf2: false,
        suppress_warnings: true,
        arch_multiple: false,
        arch_name: "ppc".to_string(),
    }
}

fn assemble(name: &str, body: &str) -> Vec<u8> {
    let path = write_temp_source(name, body);
    let isa = PpcIsa::default();
    let driver = Driver::new(&isa, default_config(), PathBuf::new(), Rc::from(path.to_string_lossy().into_owned()));
    let bytes = driver.assemble(Some(&path)).expect("assembly should succeed");
    let _ = std::fs::remove_file(&path);
    bytes
}

#[test]
fn simple_text_and_data_sections_lay_out_contiguously() {
    let bytes = assemble(
        "text_data",
        r#"
            .text
start:
            addi r1, r1, -16
            lwz  r3, 0(r1)
            .data
value:
            .long 42
        "#,
    );
    let obj = object::File::parse(&*bytes).expect("parse object");
    let text = obj.section_by_name("__text").expect("__text section");
    assert_eq!(text.size(), 8);
    let data = obj.section_by_name("__data").expect("__data section");
    assert_eq!(data.data().unwrap(), &42u32.to_be_bytes()[..]);
}

#[test]
fn local_label_branch_resolves_without_emitting_a_relocation() {
    let bytes = assemble(
        "local_branch",
        r#"
            .text
1:
            addi r1, r1, 0
            b 1b
        "#,
    );
    let obj = object::File::parse(&*bytes).expect("parse object");
    let text = obj.section_by_name("__text").expect("__text section");
    assert_eq!(text.size(), 8);
    // The branch target is a label defined in the same section, so layout
    // bakes the displacement directly into the instruction word instead of
    // leaving it for the linker to fix up.
    let relocations: Vec<_> = text.relocations().collect();
    assert!(relocations.is_empty(), "a same-section local branch should resolve without a relocation");
    let code = text.data().unwrap();
    let word = u32::from_be_bytes(code[4..8].try_into().unwrap());
    // Target is at offset 0, the branch instruction itself at offset 4: LI == -4.
    assert_eq!(word & 0x03ff_fffc, 0x03ff_fffc);
}

#[test]
fn section_difference_resolves_to_an_absolute_constant() {
    let bytes = assemble(
        "sectdiff",
        r#"
            .text
a:
            addi r1, r1, 0
b:
            addi r1, r1, 0
            .set distance, b - a
            .long distance
        "#,
    );
    let obj = object::File::parse(&*bytes).expect("parse object");
    let text = obj.section_by_name("__text").expect("__text section");
    let code = text.data().unwrap();
    // Two 4-byte instructions precede the `.long`, so the in-frag
    // DIFFSECT fold should have produced 4 there.
    let long_bytes = &code[8..12];
    assert_eq!(u32::from_be_bytes(long_bytes.try_into().unwrap()), 4);
}

#[test]
fn macro_expansion_substitutes_positional_arguments() {
    let bytes = assemble(
        "macro_expand",
        r#"
            .macro load_imm
            addi $1, $1, $2
            .endmacro
            .text
            load_imm r3, 7
        "#,
    );
    let obj = object::File::parse(&*bytes).expect("parse object");
    let text = obj.section_by_name("__text").expect("__text section");
    let code = text.data().unwrap();
    assert_eq!(code.len(), 4);
    let word = u32::from_be_bytes(code[0..4].try_into().unwrap());
    assert_eq!(word & 0xffff, 7);
}

#[test]
fn conditional_assembly_skips_the_false_branch() {
    let bytes = assemble(
        "conditional",
        r#"
            .text
            .if 0
            addi r1, r1, 1
            .else
            addi r1, r1, 2
            .endif
        "#,
    );
    let obj = object::File::parse(&*bytes).expect("parse object");
    let text = obj.section_by_name("__text").expect("__text section");
    let code = text.data().unwrap();
    assert_eq!(code.len(), 4);
    let word = u32::from_be_bytes(code[0..4].try_into().unwrap());
    assert_eq!(word & 0xffff, 2);
}

#[test]
fn branch_prediction_y_bit_is_set_on_a_predicted_hint() {
    let bytes = assemble(
        "branch_predict",
        r#"
            .text
            bc+ 12, 2, target
target:
            addi r1, r1, 0
        "#,
    );
    let obj = object::File::parse(&*bytes).expect("parse object");
    let text = obj.section_by_name("__text").expect("__text section");
    let code = text.data().unwrap();
    let word = u32::from_be_bytes(code[0..4].try_into().unwrap());
    let bo = (word >> 21) & 0x1f;
    assert_eq!(bo & 1, 1, "predicted-taken hint should set the Y bit in BO");
}

#[test]
fn defined_symbols_appear_in_the_emitted_symbol_table() {
    let bytes = assemble(
        "symbols",
        r#"
            .text
            .globl entry
entry:
            addi r1, r1, 0
        "#,
    );
    let obj = object::File::parse(&*bytes).expect("parse object");
    assert!(obj.symbols().any(|s| s.name() == Ok("entry")));
}
