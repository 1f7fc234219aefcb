// tests/pipeline_tests.rs

mod common;

use common::{compile, compile_err, error_kind, symbol_data, UNIT};
use lodestar::archive::{Relocation, RelocationKind, Section};
use lodestar::ast::Tag;
use lodestar::config::{CompileOptions, LinkOptions};
use lodestar::engine::{lower_source, parse_source, scheduled_passes, trace_source};
use lodestar::errors::ErrorKind;
use lodestar::linker::link;
use lodestar::passes::simplify::simplify;
use lodestar::passes::{PassContext, ScheduleOptions};
use lodestar::types::TypeInfo;

fn abs(offset: usize, symbol: &str) -> Relocation {
    Relocation::new(offset, symbol, RelocationKind::Absolute16)
}

// ---
// Minimal programs
// ---

#[test]
fn empty_main_is_a_single_rts() {
    let archive = compile("fun main() endfun\n");
    assert_eq!(archive.unit, UNIT);
    assert_eq!(archive.symbols.len(), 1);

    let main = &archive.symbols["demo.main"];
    assert_eq!(main.section, Section::Text);
    assert_eq!(main.data, vec![0x60]);
    assert!(main.relocations.is_empty());
    assert_eq!(main.type_info, TypeInfo::function(TypeInfo::Void, vec![]));
    assert!(archive.constants.is_empty());
}

#[test]
fn explicit_return_is_not_doubled() {
    let archive = compile("fun main()\n  return\nendfun\n");
    assert_eq!(symbol_data(&archive, "demo.main"), vec![0x60]);
}

#[test]
fn empty_unit_compiles_to_an_empty_archive() {
    let archive = compile("// nothing\n");
    assert!(archive.symbols.is_empty());
}

// ---
// Globals and constants
// ---

#[test]
fn globals_become_data_symbols() {
    let text = "\
let mut counter: u8 = 5
let wide: u16 = $1234
let stash fast: u8 = 0
fun main() endfun
";
    let archive = compile(text);
    let counter = &archive.symbols["demo.counter"];
    assert_eq!(counter.section, Section::Data);
    assert_eq!(counter.data, vec![5]);
    assert_eq!(archive.symbols["demo.wide"].data, vec![0x34, 0x12]);
    assert_eq!(archive.symbols["demo.wide"].type_info, TypeInfo::U16);
    assert_eq!(archive.symbols["demo.fast"].section, Section::Zp);
}

#[test]
fn global_initializers_must_be_constant() {
    let text = "let a: u8 = 1\nlet b: u8 = a\n";
    assert!(matches!(error_kind(text), ErrorKind::Constant { .. }));
}

#[test]
fn constants_are_folded_and_exported() {
    let text = "\
constant BASE: u8 = 2
constant LIMIT: u8 = BASE * 3 + 1
let mut x: u8 = 0
fun main()
  x = LIMIT
endfun
";
    let archive = compile(text);
    let limit = &archive.constants["demo.LIMIT"];
    assert_eq!(limit.value, 7);
    assert_eq!(limit.type_info, TypeInfo::U8);
    assert_eq!(archive.constants["demo.BASE"].value, 2);

    let main = &archive.symbols["demo.main"];
    assert_eq!(main.data, vec![0xA9, 0x07, 0x8D, 0x00, 0x00, 0x60]);
    assert_eq!(main.relocations, vec![abs(3, "demo.x")]);
}

#[test]
fn constants_must_be_defined_before_use() {
    let archive = compile("constant B: u8 = 4\nconstant A: u8 = B + 1\n");
    assert_eq!(archive.constants["demo.A"].value, 5);

    let text = "constant A: u8 = B + 1\nconstant B: u8 = 4\n";
    assert!(matches!(error_kind(text), ErrorKind::Constant { .. }));
}

#[test]
fn constant_out_of_range_is_rejected() {
    assert!(matches!(
        error_kind("constant BIG: u8 = 200 + 100\n"),
        ErrorKind::Constant { .. }
    ));
}

#[test]
fn constant_expressions_cannot_read_variables() {
    let text = "let v: u8 = 1\nconstant C: u8 = v\n";
    assert!(matches!(error_kind(text), ErrorKind::Constant { .. }));
}

// ---
// Functions
// ---

#[test]
fn assignment_with_arithmetic() {
    let text = "\
let mut counter: u8 = 5
fun main()
  counter = counter + 1
endfun
";
    let archive = compile(text);
    let main = &archive.symbols["demo.main"];
    assert_eq!(
        main.data,
        vec![0xAD, 0x00, 0x00, 0x18, 0x69, 0x01, 0x8D, 0x00, 0x00, 0x60]
    );
    assert_eq!(main.relocations, vec![abs(1, "demo.counter"), abs(7, "demo.counter")]);
}

#[test]
fn subtraction_sets_carry_first() {
    let text = "let mut n: u8 = 9\nfun main()\n  n = n - 2\nendfun\n";
    let archive = compile(text);
    assert_eq!(
        symbol_data(&archive, "demo.main"),
        vec![0xAD, 0x00, 0x00, 0x38, 0xE9, 0x02, 0x8D, 0x00, 0x00, 0x60]
    );
}

#[test]
fn zero_page_variables_use_short_addressing() {
    let text = "let stash z: u8 = 0\nfun main()\n  z = 3\nendfun\n";
    let archive = compile(text);
    let main = &archive.symbols["demo.main"];
    assert_eq!(main.data, vec![0xA9, 0x03, 0x85, 0x00, 0x60]);
    assert_eq!(
        main.relocations,
        vec![Relocation::new(3, "demo.z", RelocationKind::ZeroPage8)]
    );
}

#[test]
fn parameters_and_locals_are_function_symbols() {
    let text = "\
fun add(a: u8, b: u8) -> u8
  let mut total: u8 = a
  total = total + b
  return total
endfun
";
    let archive = compile(text);
    for name in ["demo.add.a", "demo.add.b", "demo.add.total"] {
        let symbol = &archive.symbols[name];
        assert_eq!(symbol.section, Section::Bss, "{name}");
        assert_eq!(symbol.data, vec![0], "{name}");
    }

    let add = &archive.symbols["demo.add"];
    assert_eq!(
        add.type_info,
        TypeInfo::function(TypeInfo::U8, vec![TypeInfo::U8, TypeInfo::U8])
    );
    assert_eq!(
        add.data,
        vec![
            0xAD, 0x00, 0x00, // lda a
            0x8D, 0x00, 0x00, // sta total
            0xAD, 0x00, 0x00, // lda total
            0x18, 0x6D, 0x00, 0x00, // clc; adc b
            0x8D, 0x00, 0x00, // sta total
            0xAD, 0x00, 0x00, // lda total
            0x60,
        ]
    );
    assert_eq!(
        add.relocations,
        vec![
            abs(1, "demo.add.a"),
            abs(4, "demo.add.total"),
            abs(7, "demo.add.total"),
            abs(11, "demo.add.b"),
            abs(14, "demo.add.total"),
            abs(17, "demo.add.total"),
        ]
    );
}

#[test]
fn calls_store_arguments_then_jump() {
    let text = "\
fun double(n: u8) -> u8
  return n + n
endfun
fun main()
  let mut r: u8 = double(3)
endfun
";
    let archive = compile(text);
    let double = &archive.symbols["demo.double"];
    assert_eq!(
        double.data,
        vec![0xAD, 0x00, 0x00, 0x18, 0x6D, 0x00, 0x00, 0x60]
    );
    assert_eq!(double.relocations, vec![abs(1, "demo.double.n"), abs(5, "demo.double.n")]);

    let main = &archive.symbols["demo.main"];
    assert_eq!(
        main.data,
        vec![0xA9, 0x03, 0x8D, 0x00, 0x00, 0x20, 0x00, 0x00, 0x8D, 0x00, 0x00, 0x60]
    );
    assert_eq!(
        main.relocations,
        vec![abs(3, "demo.double.n"), abs(6, "demo.double"), abs(9, "demo.main.r")]
    );
}

#[test]
fn call_statements_and_returned_calls() {
    let text = "\
fun five() -> u8
  return 5
endfun
fun ping() endfun
fun main() -> u8
  ping()
  return five()
endfun
";
    let archive = compile(text);
    assert_eq!(symbol_data(&archive, "demo.five"), vec![0xA9, 0x05, 0x60]);
    let main = &archive.symbols["demo.main"];
    assert_eq!(main.data, vec![0x20, 0x00, 0x00, 0x20, 0x00, 0x00, 0x60]);
    assert_eq!(main.relocations, vec![abs(1, "demo.ping"), abs(4, "demo.five")]);
}

#[test]
fn same_local_name_in_two_functions() {
    let text = "\
fun f()
  let x: u8 = 1
endfun
fun g()
  let x: u8 = 2
endfun
";
    let archive = compile(text);
    assert!(archive.symbols.contains_key("demo.f.x"));
    assert!(archive.symbols.contains_key("demo.g.x"));
}

#[test]
fn memory_intrinsics_address_hardware() {
    let text = "\
use mem
fun main()
  @mem.addr8($d020) = 1
endfun
";
    let archive = compile(text);
    let main = &archive.symbols["demo.main"];
    assert_eq!(main.data, vec![0xA9, 0x01, 0x8D, 0x20, 0xD0, 0x60]);
    assert!(main.relocations.is_empty());
}

#[test]
fn literal_addresses_can_be_dereferenced() {
    let archive = compile("fun main()\n  @$fb = 7\nendfun\n");
    assert_eq!(symbol_data(&archive, "demo.main"), vec![0xA9, 0x07, 0x85, 0xFB, 0x60]);
}

// ---
// Errors
// ---

#[test]
fn unknown_names_are_reported_with_their_span() {
    let err = compile_err("fun main()\n  missing = 1\nendfun\n");
    match err.kind {
        ErrorKind::UnknownName { name } => assert_eq!(name, "missing"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.span.map(|s| s.start()), Some((2, 2)));
}

#[test]
fn duplicate_definitions_are_rejected() {
    let text = "fun main() endfun\nfun main() endfun\n";
    assert!(matches!(error_kind(text), ErrorKind::DuplicateDefinition { .. }));
}

#[test]
fn immutable_variables_cannot_be_assigned() {
    let text = "let fixed: u8 = 1\nfun main()\n  fixed = 2\nendfun\n";
    let err = compile_err(text);
    assert!(matches!(err.kind, ErrorKind::Type { .. }), "{:?}", err.kind);
    assert!(err.help.is_some());
}

#[test]
fn type_mismatches_are_reported() {
    let text = "let mut small: u8 = 0\nlet big: u16 = 0\nfun main()\n  small = big\nendfun\n";
    assert!(matches!(error_kind(text), ErrorKind::Type { .. }));
}

#[test]
fn argument_count_is_checked() {
    let text = "fun f(a: u8) endfun\nfun main()\n  f()\nendfun\n";
    assert!(matches!(error_kind(text), ErrorKind::Type { .. }));
}

#[test]
fn multiplication_has_no_machine_equivalent() {
    let text = "let mut a: u8 = 2\nfun main()\n  a = a * 2\nendfun\n";
    assert!(matches!(error_kind(text), ErrorKind::Assembly { .. }));
}

#[test]
fn wide_variables_cannot_be_assembled() {
    let text = "let mut w: u16 = 0\nfun main()\n  w = 1\nendfun\n";
    assert!(matches!(error_kind(text), ErrorKind::Assembly { .. }));
}

#[test]
fn unknown_units_are_rejected() {
    assert!(matches!(error_kind("use gfx\n"), ErrorKind::UnknownName { .. }));
}

#[test]
fn syntax_errors_surface_from_compile() {
    assert!(matches!(error_kind("fun main(\n"), ErrorKind::Unclosed { .. }));
}

// ---
// Pipeline properties
// ---

#[test]
fn passes_never_modify_their_input() {
    let text = "\
constant K: u8 = 3
let mut total: u8 = 0
fun add(a: u8) -> u8
  let mut t: u8 = a
  t = t + K
  return t
endfun
fun main()
  total = add(1)
endfun
";
    let mut tree = simplify(&parse_source(text).unwrap()).unwrap();
    let cx = PassContext::new(UNIT);
    for pass in scheduled_passes(&CompileOptions::default()).unwrap() {
        let before = tree.to_string();
        let after = pass.run(&tree, &cx).unwrap();
        assert_eq!(tree.to_string(), before, "{} changed its input", pass.name());
        tree = after;
    }
}

#[test]
fn trace_records_every_step() {
    let snapshots = trace_source("fun main() endfun\n", UNIT, &CompileOptions::default()).unwrap();
    let passes = scheduled_passes(&CompileOptions::default()).unwrap();
    assert_eq!(snapshots.len(), passes.len() + 2);
    assert_eq!(snapshots[0].step, "parse");
    assert_eq!(snapshots[1].step, "simplify");
    let steps: Vec<&str> = snapshots[2..].iter().map(|s| s.step).collect();
    let names: Vec<&str> = passes.iter().map(|p| p.name()).collect();
    assert_eq!(steps, names);
}

#[test]
fn shuffled_schedules_produce_the_same_archive() {
    let text = "\
let mut counter: u8 = 1
fun bump(by: u8)
  counter = counter + by
endfun
fun main()
  bump(2)
endfun
";
    let expected = compile(text);
    for seed in [1, 2, 3, 42] {
        let options = CompileOptions {
            schedule: ScheduleOptions {
                deterministic: false,
                seed: Some(seed),
            },
        };
        let archive = lodestar::engine::compile_source(text, UNIT, &options).unwrap();
        assert_eq!(archive, expected, "seed {seed}");
    }
}

#[test]
fn lowered_tree_has_only_symbols() {
    let tree = lower_source("let g: u8 = 1\nfun main() endfun\n", UNIT, &CompileOptions::default()).unwrap();
    let tags: Vec<Tag> = tree.select(&["body", "item"]).iter().map(|n| n.tag()).collect();
    assert_eq!(tags, vec![Tag::DataSymbol, Tag::FunSymbol]);
}

#[test]
fn compiled_program_links() {
    let text = "\
let mut counter: u8 = 5
fun main()
  counter = counter + 1
endfun
";
    let archive = compile(text);
    let options = LinkOptions {
        entry: Some("demo.main".into()),
        ..LinkOptions::default()
    };
    let image = link(&[archive], &options).unwrap();
    assert_eq!(image.symbols["demo.main"], 0x0800);
    assert_eq!(image.symbols["demo.counter"], 0x080A);
    assert_eq!(
        image.bytes,
        vec![0xAD, 0x0A, 0x08, 0x18, 0x69, 0x01, 0x8D, 0x0A, 0x08, 0x60, 0x05]
    );
    assert_eq!(&image.to_bytes(true)[..2], &[0x00, 0x08]);
}
