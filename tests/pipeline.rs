//! Stage-level tests of the differencing pipeline, driven through synthetic
//! containers built with the public model API.

use goblin::elf::reloc::{R_X86_64_32S, R_X86_64_64, R_X86_64_PC32};
use goblin::elf::section_header::{
    SHF_ALLOC, SHF_EXECINSTR, SHT_GROUP, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB,
};
use goblin::elf::sym::{STB_GLOBAL, STB_LOCAL, STT_FILE, STT_FUNC, STT_NOTYPE, STT_OBJECT, STT_SECTION};

use objdelta::object::{ElfObject, Rela, Section, SectionId, Symbol, SymbolId};
use objdelta::{anchor, bundle, compare, correlate, include, migrate, replace, verify};
use objdelta::{Arch, DiffError, RunningElf, RunningSymbol, Status, ST_OTHER_EXTERN};

struct Builder {
    obj: ElfObject,
}

impl Builder {
    fn new() -> Builder {
        let mut obj = ElfObject::new("t.o", Arch::X86_64);
        obj.push_symbol(Symbol::new("", STT_NOTYPE, STB_LOCAL));
        Builder { obj }
    }

    fn with_standard_sections() -> Builder {
        let mut b = Builder::new();
        b.section(".symtab", SHT_SYMTAB, 0, &[]);
        b.section(".strtab", SHT_STRTAB, 0, &[]);
        b.section(".shstrtab", SHT_STRTAB, 0, &[]);
        b
    }

    fn section(&mut self, name: &str, sh_type: u32, flags: u64, data: &[u8]) -> SectionId {
        let mut sec = Section::new(name, sh_type);
        sec.sh.sh_flags = flags;
        sec.sh.sh_size = data.len() as u64;
        sec.data = data.to_vec();
        sec.index = self.obj.sections.len() + 1;
        self.obj.push_section(sec)
    }

    fn func(&mut self, name: &str, body: &[u8], bind: u8) -> (SectionId, SymbolId) {
        let sec = self.section(
            &format!(".text.{}", name),
            SHT_PROGBITS,
            u64::from(SHF_ALLOC | SHF_EXECINSTR),
            body,
        );
        let sym = self.define(name, STT_FUNC, bind, sec, body.len() as u64);
        (sec, sym)
    }

    fn object(&mut self, section: &str, name: &str, data: &[u8], bind: u8) -> (SectionId, SymbolId) {
        let sec = self.section(section, SHT_PROGBITS, u64::from(SHF_ALLOC), data);
        let sym = self.define(name, STT_OBJECT, bind, sec, data.len() as u64);
        (sec, sym)
    }

    fn define(&mut self, name: &str, typ: u8, bind: u8, sec: SectionId, size: u64) -> SymbolId {
        let mut sym = Symbol::new(name, typ, bind);
        sym.sec = Some(sec);
        sym.sym.st_size = size;
        sym.sym.st_shndx = self.obj[sec].index;
        self.obj.push_symbol(sym)
    }

    fn file(&mut self, name: &str) -> SymbolId {
        let mut sym = Symbol::new(name, STT_FILE, STB_LOCAL);
        sym.sym.st_shndx = 0xfff1;
        self.obj.push_symbol(sym)
    }

    fn undefined(&mut self, name: &str) -> SymbolId {
        self.obj.push_symbol(Symbol::new(name, STT_NOTYPE, STB_GLOBAL))
    }

    fn secsym(&mut self, sec: SectionId) -> SymbolId {
        let mut sym = Symbol::new(self.obj[sec].name.clone(), STT_SECTION, STB_LOCAL);
        sym.sec = Some(sec);
        sym.sym.st_shndx = self.obj[sec].index;
        let id = self.obj.push_symbol(sym);
        self.obj[sec].secsym = Some(id);
        id
    }

    fn rela(&mut self, base: SectionId, relas: Vec<Rela>) -> SectionId {
        let name = format!(".rela{}", self.obj[base].name);
        let mut sec = Section::new(name, goblin::elf::section_header::SHT_RELA);
        sec.index = self.obj.sections.len() + 1;
        sec.base = Some(base);
        sec.relas = relas;
        let id = self.obj.push_section(sec);
        self.obj[base].rela = Some(id);
        id
    }

    fn finish(self) -> ElfObject {
        self.obj
    }
}

fn running_with(syms: Vec<RunningSymbol>) -> RunningElf {
    RunningElf {
        name: "app".into(),
        syms,
    }
}

fn rsym(name: &str, typ: u8, bind: u8, value: u64, size: u64) -> RunningSymbol {
    RunningSymbol {
        name: name.into(),
        typ,
        bind,
        value,
        size,
        shndx: 1,
    }
}

#[test]
fn bundler_attaches_defining_symbols() {
    let mut b = Builder::new();
    let (text, foo) = b.func("foo", &[0xc3], STB_GLOBAL);
    let (data, tbl) = b.object(".data.rel.ro.tbl", "tbl", &[0; 8], STB_LOCAL);
    // cold subfunction living in the parent's unlikely section
    let cold_sec = b.section(
        ".text.unlikely.foo",
        SHT_PROGBITS,
        u64::from(SHF_ALLOC | SHF_EXECINSTR),
        &[0xc3],
    );
    let cold = b.define("foo.cold", STT_FUNC, STB_LOCAL, cold_sec, 1);
    // a shared section does not bundle
    let shared = b.section(".text", SHT_PROGBITS, u64::from(SHF_ALLOC | SHF_EXECINSTR), &[0xc3; 4]);
    b.define("stray", STT_FUNC, STB_LOCAL, shared, 4);
    let mut obj = b.finish();

    bundle::bundle_symbols(&mut obj).unwrap();
    assert_eq!(obj[text].sym, Some(foo));
    assert_eq!(obj[data].sym, Some(tbl));
    assert_eq!(obj[cold_sec].sym, Some(cold));
    assert_eq!(obj[shared].sym, None);
}

#[test]
fn bundled_symbol_off_origin_is_fatal() {
    let mut b = Builder::new();
    let (_, foo) = b.func("foo", &[0x90, 0xc3], STB_GLOBAL);
    let mut obj = b.finish();
    obj[foo].sym.st_value = 1;

    match bundle::bundle_symbols(&mut obj) {
        Err(DiffError::BundledSymbolOffset { name, value, .. }) => {
            assert_eq!(name, "foo");
            assert_eq!(value, 1);
        }
        other => panic!("expected BundledSymbolOffset, got {:?}", other),
    }
}

#[test]
fn kinship_links_cold_and_part_subfunctions() {
    let mut b = Builder::new();
    let (_, foo) = b.func("foo", &[0xc3], STB_GLOBAL);
    let (_, foo_cold) = b.func("foo.cold", &[0xc3], STB_LOCAL);
    let (_, bar) = b.func("bar", &[0xc3], STB_GLOBAL);
    let (_, bar_part) = b.func("bar.part.0", &[0xc3], STB_LOCAL);
    let (_, orphan) = b.func("gone.cold", &[0xc3], STB_LOCAL);
    let mut obj = b.finish();

    bundle::detect_child_functions(&mut obj);
    assert_eq!(obj[foo_cold].parent, Some(foo));
    assert_eq!(obj[bar_part].parent, Some(bar));
    assert!(obj[foo].children.contains(&foo_cold));
    assert_eq!(obj[orphan].parent, None);
}

#[test]
fn replacer_redirects_section_relative_references() {
    let mut b = Builder::new();
    let rodata = b.section(".rodata", SHT_PROGBITS, u64::from(SHF_ALLOC), &[0; 16]);
    let rodata_sym = b.secsym(rodata);
    let a = b.define("a", STT_OBJECT, STB_LOCAL, rodata, 8);
    let bsym = b.define("b", STT_OBJECT, STB_LOCAL, rodata, 8);
    b.obj[bsym].sym.st_value = 8;
    let (text, _foo) = b.func("foo", &[0; 32], STB_GLOBAL);
    let relasec = b.rela(
        text,
        vec![
            Rela {
                typ: R_X86_64_64,
                sym: rodata_sym,
                offset: 0,
                addend: 12,
            },
            Rela {
                typ: R_X86_64_PC32,
                sym: rodata_sym,
                offset: 8,
                addend: -4,
            },
        ],
    );
    let mut obj = b.finish();

    replace::replace_section_syms(&mut obj).unwrap();
    assert_eq!(obj[relasec].relas[0].sym, bsym);
    assert_eq!(obj[relasec].relas[0].addend, 4);
    assert_eq!(obj[relasec].relas[1].sym, a);
    assert_eq!(obj[relasec].relas[1].addend, -4);

    // running the pass again must not move anything
    let snapshot = obj[relasec].relas.clone();
    replace::replace_section_syms(&mut obj).unwrap();
    assert_eq!(obj[relasec].relas, snapshot);
}

#[test]
fn replacer_redirects_to_bundled_symbol() {
    let mut b = Builder::new();
    let (callee_sec, callee) = b.func("callee", &[0xc3], STB_LOCAL);
    let callee_secsym = b.secsym(callee_sec);
    let (text, _) = b.func("caller", &[0; 16], STB_GLOBAL);
    let relasec = b.rela(
        text,
        vec![Rela {
            typ: R_X86_64_PC32,
            sym: callee_secsym,
            offset: 4,
            addend: -4,
        }],
    );
    let mut obj = b.finish();

    bundle::bundle_symbols(&mut obj).unwrap();
    replace::replace_section_syms(&mut obj).unwrap();
    assert_eq!(obj[relasec].relas[0].sym, callee);
    assert_eq!(obj[relasec].relas[0].addend, -4);
}

#[test]
fn replacer_rejects_unresolvable_references() {
    let mut b = Builder::new();
    let helper = b.section(
        ".text.helper",
        SHT_PROGBITS,
        u64::from(SHF_ALLOC | SHF_EXECINSTR),
        &[0xc3; 8],
    );
    let helper_sym = b.secsym(helper);
    let (text, _) = b.func("foo", &[0; 16], STB_GLOBAL);
    b.rela(
        text,
        vec![Rela {
            typ: R_X86_64_PC32,
            sym: helper_sym,
            offset: 0,
            addend: -4,
        }],
    );
    let mut obj = b.finish();

    match replace::replace_section_syms(&mut obj) {
        Err(DiffError::UnresolvedReference { name, .. }) => assert_eq!(name, ".text.helper"),
        other => panic!("expected UnresolvedReference, got {:?}", other),
    }
}

#[test]
fn replacer_rejects_end_of_section_references() {
    let mut b = Builder::new();
    let data = b.section(".data", SHT_PROGBITS, u64::from(SHF_ALLOC), &[0; 8]);
    let data_sym = b.secsym(data);
    b.define("g", STT_OBJECT, STB_LOCAL, data, 8);
    let (text, _) = b.func("foo", &[0; 16], STB_GLOBAL);
    b.rela(
        text,
        vec![Rela {
            typ: R_X86_64_32S,
            sym: data_sym,
            offset: 2,
            addend: 8,
        }],
    );
    let mut obj = b.finish();

    match replace::replace_section_syms(&mut obj) {
        Err(DiffError::EndOfSectionReference { section }) => assert_eq!(section, ".data"),
        other => panic!("expected EndOfSectionReference, got {:?}", other),
    }
}

/// Two structurally identical objects: every correlated element is SAME and
/// nothing is selected.
#[test]
fn identical_objects_produce_no_changes() {
    let build = || {
        let mut b = Builder::with_standard_sections();
        let (text, _) = b.func("foo", &[0x55, 0xc3], STB_GLOBAL);
        let ext = b.undefined("ext");
        b.rela(
            text,
            vec![Rela {
                typ: R_X86_64_PC32,
                sym: ext,
                offset: 1,
                addend: -4,
            }],
        );
        b.finish()
    };
    let mut source = build();
    let mut patched = build();

    bundle::bundle_symbols(&mut source).unwrap();
    bundle::bundle_symbols(&mut patched).unwrap();
    correlate::correlate(&mut source, &mut patched);
    compare::compare_correlated_elements(&mut patched, &source).unwrap();

    for sec in &patched.sections {
        assert_eq!(sec.status, Status::Same, "section {}", sec.name);
    }
    include::include_standard_elements(&mut patched);
    assert_eq!(include::include_changed_functions(&mut patched), 0);
    assert_eq!(include::include_new_globals(&mut patched), 0);
    verify::verify_patchability(&patched).unwrap();
}

fn build_changed_pair() -> (ElfObject, ElfObject) {
    let build = |foo_body: &[u8]| {
        let mut b = Builder::with_standard_sections();
        let (foo_sec, _) = b.func("foo", foo_body, STB_GLOBAL);
        let ext = b.undefined("ext");
        b.rela(
            foo_sec,
            vec![Rela {
                typ: R_X86_64_PC32,
                sym: ext,
                offset: 1,
                addend: -4,
            }],
        );
        b.func("bar", &[0x31, 0xc0, 0xc3], STB_GLOBAL);
        b.finish()
    };
    let mut source = build(&[0x55, 0x90, 0xc3]);
    let mut patched = build(&[0x55, 0x91, 0xc3]);

    bundle::bundle_symbols(&mut source).unwrap();
    bundle::bundle_symbols(&mut patched).unwrap();
    correlate::correlate(&mut source, &mut patched);
    compare::compare_correlated_elements(&mut patched, &source).unwrap();
    (source, patched)
}

/// A one-instruction body change selects the function, its relocations,
/// its relocation targets, and nothing else.
#[test]
fn single_function_change_selects_minimal_set() {
    let (_source, mut patched) = build_changed_pair();

    let foo_sec = patched.find_section_by_name(".text.foo").unwrap();
    let bar_sec = patched.find_section_by_name(".text.bar").unwrap();
    assert_eq!(patched[foo_sec].status, Status::Changed);
    assert_eq!(patched[bar_sec].status, Status::Same);

    include::include_standard_elements(&mut patched);
    let changed = include::include_changed_functions(&mut patched);
    let new_globals = include::include_new_globals(&mut patched);
    assert_eq!(changed, 1);
    assert_eq!(new_globals, 0);

    assert!(patched[foo_sec].include);
    assert!(patched[patched[foo_sec].rela.unwrap()].include);
    assert!(!patched[bar_sec].include);
    let ext = patched.find_symbol_by_name("ext").unwrap();
    assert!(patched[ext].include);

    verify::verify_patchability(&patched).unwrap();

    let out = migrate::migrate_included_elements(patched).unwrap();
    assert!(out.find_section_by_name(".text.foo").is_some());
    assert!(out.find_section_by_name(".rela.text.foo").is_some());
    assert!(out.find_section_by_name(".text.bar").is_none());
    assert!(out.find_section_by_name(".symtab").is_some());
    assert!(out.find_section_by_name(".strtab").is_some());
    assert!(out.find_section_by_name(".shstrtab").is_some());

    let foo = out.find_symbol_by_name("foo").unwrap();
    assert!(out[foo].sec.is_some());
    // every surviving relocation targets a migrated symbol
    for sec in &out.sections {
        for rela in &sec.relas {
            assert!(rela.sym.0 < out.symbols.len());
        }
    }
    // bar did not travel
    assert!(out.find_symbol_by_name("bar").is_none());
}

/// Re-running the includer on its own output adds nothing.
#[test]
fn includer_reaches_fixed_point_in_one_pass() {
    let (_source, mut patched) = build_changed_pair();

    include::include_standard_elements(&mut patched);
    include::include_changed_functions(&mut patched);
    include::include_new_globals(&mut patched);

    let sections: Vec<bool> = patched.sections.iter().map(|s| s.include).collect();
    let symbols: Vec<bool> = patched.symbols.iter().map(|s| s.include).collect();

    include::include_standard_elements(&mut patched);
    include::include_changed_functions(&mut patched);
    include::include_new_globals(&mut patched);

    assert_eq!(
        sections,
        patched.sections.iter().map(|s| s.include).collect::<Vec<_>>()
    );
    assert_eq!(
        symbols,
        patched.symbols.iter().map(|s| s.include).collect::<Vec<_>>()
    );
}

/// A SAME local callee of a changed function is kept as an empty stub the
/// loader resolves externally.
#[test]
fn same_local_callee_becomes_stub() {
    let build = |foo_body: &[u8]| {
        let mut b = Builder::with_standard_sections();
        let (helper_sec, helper) = b.func("helper", &[0x90, 0xc3], STB_LOCAL);
        b.secsym(helper_sec);
        let (foo_sec, _) = b.func("foo", foo_body, STB_GLOBAL);
        b.rela(
            foo_sec,
            vec![Rela {
                typ: R_X86_64_PC32,
                sym: helper,
                offset: 1,
                addend: -4,
            }],
        );
        b.finish()
    };
    let mut source = build(&[0x55, 0x90, 0xc3]);
    let mut patched = build(&[0x55, 0x91, 0xc3]);

    bundle::bundle_symbols(&mut source).unwrap();
    bundle::bundle_symbols(&mut patched).unwrap();
    correlate::correlate(&mut source, &mut patched);
    compare::compare_correlated_elements(&mut patched, &source).unwrap();

    include::include_standard_elements(&mut patched);
    assert_eq!(include::include_changed_functions(&mut patched), 1);

    let helper = patched.find_symbol_by_name("helper").unwrap();
    let helper_sec = patched[helper].sec.unwrap();
    assert!(patched[helper].include);
    assert_ne!(patched[helper].sym.st_other & ST_OTHER_EXTERN, 0);
    assert!(patched[helper_sec].include);
    assert!(patched[helper_sec].data.is_empty());
    assert_eq!(patched[helper_sec].sh.sh_size, 0);
    // the stub's relocations must not drag dependencies in
    assert!(patched[helper_sec].rela.is_none());
}

/// A global added by the patch is carried as NEW.
#[test]
fn new_global_function_is_included() {
    let mut source = Builder::with_standard_sections();
    source.func("foo", &[0xc3], STB_GLOBAL);
    let mut source = source.finish();

    let mut patched = Builder::with_standard_sections();
    patched.func("foo", &[0xc3], STB_GLOBAL);
    let (bar_sec, bar) = patched.func("bar", &[0x90, 0xc3], STB_GLOBAL);
    let mut patched = patched.finish();

    bundle::bundle_symbols(&mut source).unwrap();
    bundle::bundle_symbols(&mut patched).unwrap();
    correlate::correlate(&mut source, &mut patched);
    compare::compare_correlated_elements(&mut patched, &source).unwrap();

    assert_eq!(patched[bar].status, Status::New);
    include::include_standard_elements(&mut patched);
    assert_eq!(include::include_changed_functions(&mut patched), 0);
    assert_eq!(include::include_new_globals(&mut patched), 1);
    assert!(patched[bar_sec].include);
    verify::verify_patchability(&patched).unwrap();
}

/// Changed data dragged in by a changed function fails verification.
#[test]
fn changed_data_section_is_rejected() {
    let build = |foo_body: &[u8], gstate: &[u8]| {
        let mut b = Builder::with_standard_sections();
        let (_, gsym) = b.object(".data.gstate", "gstate", gstate, STB_LOCAL);
        let (foo_sec, _) = b.func("foo", foo_body, STB_GLOBAL);
        b.rela(
            foo_sec,
            vec![Rela {
                typ: R_X86_64_PC32,
                sym: gsym,
                offset: 1,
                addend: -4,
            }],
        );
        b.finish()
    };
    let mut source = build(&[0x55, 0x90, 0xc3], &[1, 2, 3, 4]);
    let mut patched = build(&[0x55, 0x91, 0xc3], &[1, 2, 3, 5]);

    bundle::bundle_symbols(&mut source).unwrap();
    bundle::bundle_symbols(&mut patched).unwrap();
    correlate::correlate(&mut source, &mut patched);
    compare::compare_correlated_elements(&mut patched, &source).unwrap();

    include::include_standard_elements(&mut patched);
    include::include_changed_functions(&mut patched);
    include::include_new_globals(&mut patched);

    match verify::verify_patchability(&patched) {
        Err(DiffError::Unpatchable(errs)) => assert_eq!(errs, 1),
        other => panic!("expected Unpatchable, got {:?}", other),
    }
}

/// A change inside a COMDAT group fails verification.
#[test]
fn grouped_section_change_is_rejected() {
    let (_source, mut patched) = build_changed_pair();
    let foo_sec = patched.find_section_by_name(".text.foo").unwrap();
    patched[foo_sec].grouped = true;

    include::include_standard_elements(&mut patched);
    include::include_changed_functions(&mut patched);

    match verify::verify_patchability(&patched) {
        Err(DiffError::Unpatchable(errs)) => assert_eq!(errs, 1),
        other => panic!("expected Unpatchable, got {:?}", other),
    }
}

#[test]
fn group_members_are_flagged() {
    let mut b = Builder::new();
    let (text, _) = b.func("foo", &[0xc3], STB_GLOBAL);
    let member_index = b.obj[text].index as u32;
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_le_bytes()); // GRP_COMDAT
    data.extend_from_slice(&member_index.to_le_bytes());
    b.section(".group", SHT_GROUP, 0, &data);
    let mut obj = b.finish();

    correlate::mark_grouped_sections(&mut obj).unwrap();
    assert!(obj[text].grouped);
}

#[test]
fn anchor_matches_unique_file_block() {
    let mut b = Builder::new();
    b.file("t.c");
    let (_, counter) = b.object(".bss.counter", "counter", &[0; 4], STB_LOCAL);
    let mut source = b.finish();

    let relf = running_with(vec![
        rsym("t.c", STT_FILE, STB_LOCAL, 0, 0),
        rsym("counter", STT_OBJECT, STB_LOCAL, 0x601000, 4),
        rsym("u.c", STT_FILE, STB_LOCAL, 0, 0),
        rsym("other", STT_OBJECT, STB_LOCAL, 0x601008, 4),
    ]);
    anchor::anchor_local_symbols(&mut source, &relf).unwrap();
    assert_eq!(source[counter].anchor, Some(0));
}

#[test]
fn duplicate_file_blocks_are_fatal() {
    let mut b = Builder::new();
    b.file("t.c");
    b.object(".bss.counter", "counter", &[0; 4], STB_LOCAL);
    let mut source = b.finish();

    let relf = running_with(vec![
        rsym("t.c", STT_FILE, STB_LOCAL, 0, 0),
        rsym("counter", STT_OBJECT, STB_LOCAL, 0x601000, 4),
        rsym("t.c", STT_FILE, STB_LOCAL, 0, 0),
        rsym("counter", STT_OBJECT, STB_LOCAL, 0x601008, 4),
    ]);
    match anchor::anchor_local_symbols(&mut source, &relf) {
        Err(DiffError::AmbiguousLocals { file }) => assert_eq!(file, "t.c"),
        other => panic!("expected AmbiguousLocals, got {:?}", other),
    }
}

#[test]
fn missing_file_block_is_fatal() {
    let mut b = Builder::new();
    b.file("t.c");
    b.object(".bss.counter", "counter", &[0; 4], STB_LOCAL);
    let mut source = b.finish();

    let relf = running_with(vec![
        rsym("t.c", STT_FILE, STB_LOCAL, 0, 0),
        rsym("other", STT_OBJECT, STB_LOCAL, 0x601000, 4),
    ]);
    match anchor::anchor_local_symbols(&mut source, &relf) {
        Err(DiffError::NoMatchingLocals { file }) => assert_eq!(file, "t.c"),
        other => panic!("expected NoMatchingLocals, got {:?}", other),
    }
}

/// Numbered static locals correlate across differing suffixes and adopt
/// the source spelling.
#[test]
fn mangled_static_locals_correlate_and_rename() {
    let mut b = Builder::new();
    b.file("t.c");
    let (_, s_counter) = b.object(".bss.counter.1234", "counter.1234", &[0; 4], STB_LOCAL);
    let mut source = b.finish();

    let mut b = Builder::new();
    b.file("t.c");
    let (p_sec, p_counter) = b.object(".bss.counter.5678", "counter.5678", &[0; 4], STB_LOCAL);
    let mut patched = b.finish();

    correlate::correlate(&mut source, &mut patched);
    assert_eq!(patched[p_counter].twin, None);
    correlate::correlate_static_locals(&mut source, &mut patched);
    assert_eq!(patched[p_counter].twin, Some(s_counter));
    assert_eq!(patched[p_counter].name, "counter.1234");
    assert_eq!(patched[p_sec].name, ".bss.counter.1234");
}

/// Debug relocations whose target section was pruned are silently dropped.
#[test]
fn debug_relocations_to_pruned_targets_are_dropped() {
    let mut b = Builder::new();
    let (foo_sec, _) = b.func("foo", &[0xc3], STB_GLOBAL);
    let foo_secsym = b.secsym(foo_sec);
    let (bar_sec, _) = b.func("bar", &[0xc3], STB_GLOBAL);
    let bar_secsym = b.secsym(bar_sec);
    let dbg = b.section(".debug_info", SHT_PROGBITS, 0, &[0; 32]);
    let dbg_rela = b.rela(
        dbg,
        vec![
            Rela {
                typ: R_X86_64_64,
                sym: foo_secsym,
                offset: 0,
                addend: 0,
            },
            Rela {
                typ: R_X86_64_64,
                sym: bar_secsym,
                offset: 8,
                addend: 0,
            },
        ],
    );
    let mut obj = b.finish();
    obj[foo_sec].include = true;

    include::include_debug_sections(&mut obj).unwrap();
    assert!(obj[dbg].include);
    assert_eq!(obj[dbg_rela].relas.len(), 1);
    assert_eq!(obj[dbg_rela].relas[0].sym, foo_secsym);
}
