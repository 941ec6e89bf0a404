//! ELF relocatable output for finished code.
//!
//! Emitted code contains no relocations against other symbols: absolute
//! targets are materialized or loaded from the inline literal pool. A single
//! `.text` section with one global function symbol is therefore enough.

use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};

use crate::core::error::JitResult;

/// Wrap `code` in an ELF64 RISC-V relocatable object defining `name`.
pub fn emit_elf(name: &str, code: &[u8]) -> JitResult<Vec<u8>> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Riscv64, Endianness::Little);

    let text = obj.section_id(StandardSection::Text);
    let offset = obj.append_section_data(text, code, 8);

    obj.add_symbol(Symbol {
        name: name.as_bytes().to_vec(),
        value: offset,
        size: code.len() as u64,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(text),
        flags: SymbolFlags::None,
    });

    let mut buf = Vec::new();
    obj.emit(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{Object as _, ObjectSection, ObjectSymbol};

    #[test]
    fn test_object_defines_symbol() {
        let code = [0x67, 0x80, 0x00, 0x00];
        let bytes = emit_elf("leaf", &code).unwrap();
        let file = object::File::parse(&*bytes).unwrap();
        assert_eq!(file.architecture(), Architecture::Riscv64);
        let text = file.section_by_name(".text").unwrap();
        assert_eq!(text.data().unwrap(), &code);
        let sym = file.symbol_by_name("leaf").unwrap();
        assert!(sym.is_global());
        assert_eq!(sym.size(), 4);
    }
}
