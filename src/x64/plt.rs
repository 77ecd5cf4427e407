// PltWalker resolves every entry of an x86-64 ELF procedure linkage table. The entries are
// fixed-size stubs in .plt.sec when the binary was linked with IBT, or in .plt after the
// lazy-binding header otherwise. Each entry is lifted with the StubLifter and handed to the
// trampoline resolver; the GOT slot it jumps through is then named after the dynamic
// relocation that fills it, which is how a disassembler labels calls to imported functions.

//! x86-64 procedure linkage table walking.

use super::stub::StubLifter;
use crate::core::error::{LiftError, LiftResult};
use crate::core::memory::{Address, MemoryImage, MemoryReader};
use crate::core::session::ScanSession;
use crate::trampoline::{self, Architecture, ResolvedTarget};
use hashbrown::HashMap;
use object::{Object, ObjectSection, ObjectSymbol, ObjectSymbolTable, RelocationTarget};
use std::fmt;

/// Size of one PLT entry.
pub const ENTRY_SIZE: usize = 16;

/// Raw contents of the section holding the PLT entries.
#[derive(Debug, Clone)]
pub struct PltSection<'data> {
    pub name: &'data str,
    pub address: u64,
    pub data: &'data [u8],
    /// The first entry is the lazy-binding header, not a stub.
    pub has_header: bool,
}

/// One resolved PLT entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PltEntry {
    pub site: Address,
    pub target: Option<ResolvedTarget>,
    /// Imported symbol whose GOT slot the entry jumps through.
    pub symbol: Option<String>,
}

impl fmt::Display for PltEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.site)?;
        match &self.target {
            Some(target) => write!(f, " -> {target}")?,
            None => f.write_str(" -> ?")?,
        }
        if let Some(symbol) = &self.symbol {
            write!(f, " {symbol}")?;
        }
        Ok(())
    }
}

pub struct PltWalker {
    lifter: StubLifter,
}

impl PltWalker {
    pub fn new() -> LiftResult<Self> {
        Ok(Self {
            lifter: StubLifter::new()?,
        })
    }

    /// Resolve the PLT entries of an x86-64 ELF image.
    ///
    /// Resolved entries are recorded in `session` when one is given.
    pub fn walk(&self, data: &[u8], session: Option<&ScanSession<'_>>) -> LiftResult<Vec<PltEntry>> {
        let file = object::File::parse(data).map_err(|e| image_error(e.to_string()))?;
        if file.architecture() != object::Architecture::X86_64 {
            return Err(image_error(format!(
                "expected an x86-64 image, found {:?}",
                file.architecture()
            )));
        }
        let section = plt_section(&file)?;
        let slots = jump_slots(&file);
        let memory = MemoryImage::from_object(data)?;
        log::info!(
            "Walking {} at {:#x} ({} bytes, {} jump slots)",
            section.name,
            section.address,
            section.data.len(),
            slots.len()
        );
        Ok(self.resolve_entries(&section, &slots, &memory, session))
    }

    /// Resolve every stub of `section`, naming GOT slots from `slots`.
    pub fn resolve_entries(
        &self,
        section: &PltSection<'_>,
        slots: &HashMap<u64, String>,
        memory: &dyn MemoryReader,
        session: Option<&ScanSession<'_>>,
    ) -> Vec<PltEntry> {
        let skip = usize::from(section.has_header);
        section
            .data
            .chunks_exact(ENTRY_SIZE)
            .enumerate()
            .skip(skip)
            .map(|(index, bytes)| {
                let ip = section.address.wrapping_add((index * ENTRY_SIZE) as u64);
                let site = Address::ptr64(ip);
                let window = self.lifter.window(bytes, ip);
                let target = trampoline::resolve(Architecture::X86_64, site, &window, memory);
                let symbol = target
                    .as_ref()
                    .and_then(ResolvedTarget::address)
                    .and_then(|slot| slots.get(&slot.value).cloned());
                if let (Some(session), Some(target)) = (session, &target) {
                    let label = symbol.clone().unwrap_or_else(|| target.to_string());
                    session.record_trampoline(site, &label);
                }
                PltEntry {
                    site,
                    target,
                    symbol,
                }
            })
            .collect()
    }
}

/// Resolve the PLT entries of an x86-64 ELF image.
pub fn walk_plt(data: &[u8], session: Option<&ScanSession<'_>>) -> LiftResult<Vec<PltEntry>> {
    PltWalker::new()?.walk(data, session)
}

fn image_error(reason: impl Into<String>) -> LiftError {
    LiftError::Image {
        reason: reason.into(),
    }
}

fn plt_section<'data>(file: &object::File<'data>) -> LiftResult<PltSection<'data>> {
    let (section, has_header) = match file.section_by_name(".plt.sec") {
        Some(section) => (section, false),
        None => file
            .section_by_name(".plt")
            .map(|section| (section, true))
            .ok_or_else(|| image_error("no .plt.sec or .plt section"))?,
    };
    let data = section.data().map_err(|e| image_error(e.to_string()))?;
    Ok(PltSection {
        name: section.name().unwrap_or(".plt"),
        address: section.address(),
        data,
        has_header,
    })
}

/// GOT slot address to the name of the symbol its dynamic relocation binds.
fn jump_slots(file: &object::File<'_>) -> HashMap<u64, String> {
    let mut slots = HashMap::new();
    let (Some(relocations), Some(symbols)) = (file.dynamic_relocations(), file.dynamic_symbol_table())
    else {
        return slots;
    };
    for (offset, relocation) in relocations {
        let RelocationTarget::Symbol(index) = relocation.target() else {
            continue;
        };
        match symbols.symbol_by_index(index).and_then(|s| s.name().map(str::to_string)) {
            Ok(name) if !name.is_empty() => {
                slots.insert(offset, name);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Unreadable symbol for relocation at {offset:#x}: {e}"),
        }
    }
    slots
}
