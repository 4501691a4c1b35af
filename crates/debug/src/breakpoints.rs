use super::*;
use crate::address::{
    FLAG_ARRAY_LEN, FLAG_RAM_BASE, FLAG_ROM_BASE, RAM_BANK_SIZE, RAM_WINDOW_START,
    ROM_BANK_SIZE, ROM_WINDOW_START, Region, to_machine_address,
};

const ARMED: u8 = 0x01;

/// The emulator's breakpoint flag array. Only the low bit of each slot
/// belongs to the debugger; the rest are the emulator's access history.
pub trait FlagMemory {
    fn arm(&mut self, slot: u32);
    fn disarm(&mut self, slot: u32);
    fn clear_all(&mut self);
}

impl FlagMemory for [u8] {
    fn arm(&mut self, slot: u32) {
        if let Some(flag) = self.get_mut(slot as usize) {
            *flag |= ARMED;
        }
    }

    fn disarm(&mut self, slot: u32) {
        if let Some(flag) = self.get_mut(slot as usize) {
            *flag &= !ARMED;
        }
    }

    fn clear_all(&mut self) {
        self.fill(0);
    }
}

/// Flag slots for code at `address` while `bank` is mapped in: the slot of
/// the current 64K view, and the bank-specific shadow slot (0 when there is
/// none).
pub fn resolve_flag_slots(bank: u8, address: u16) -> (u32, u32) {
    let primary = u32::from(address);
    let (base, window, bank_size, region_len) = match Region::of(address) {
        Region::Direct => return (primary, 0),
        Region::BankedRam => (
            FLAG_RAM_BASE,
            RAM_WINDOW_START,
            RAM_BANK_SIZE,
            FLAG_ROM_BASE - FLAG_RAM_BASE,
        ),
        Region::BankedRom => (
            FLAG_ROM_BASE,
            ROM_WINDOW_START,
            ROM_BANK_SIZE,
            FLAG_ARRAY_LEN - FLAG_ROM_BASE,
        ),
    };

    let offset = u32::from(bank) * bank_size + u32::from(address - window);
    if offset >= region_len {
        return (primary, 0);
    }
    let secondary = base + offset;
    (primary, if secondary == primary { 0 } else { secondary })
}

/// An armed breakpoint and the flag slots it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointPair {
    pub path: String,
    pub line: u32,
    pub address: u32,
    pub primary: u32,
    pub secondary: u32,
}

/// Outcome of one requested line. Unverified lines are reported but not
/// armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBreakpoint {
    pub line: u32,
    pub verified: bool,
    pub address: Option<u32>,
}

#[derive(Debug, Default)]
pub struct BreakpointCoordinator {
    pairs: FxHashMap<String, Vec<BreakpointPair>>,
}

impl BreakpointCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every breakpoint of `path` with `lines` (0-based).
    ///
    /// A line resolves through the addresses recorded for it in `index`; when
    /// `path` has none, the source graph is walked down to address-bearing
    /// nodes instead. The lowest address wins. If any line fails to resolve,
    /// the breakpoints already set for `path` stay as they were.
    pub fn set_breakpoints<F>(
        &mut self,
        path: &str,
        lines: &[u32],
        index: &SourceMapIndex,
        flags: &mut F,
    ) -> Result<Vec<ResolvedBreakpoint>, SourceMapError>
    where
        F: FlagMemory + ?Sized,
    {
        let source = index.graph().find(path);
        let mut targets = Vec::with_capacity(lines.len());
        for &line in lines {
            let mut address = source
                .and_then(|id| index.addresses_for_line(id, line).first().copied());
            if address.is_none() && source.is_some() {
                address = index
                    .find_ultimate_addresses(path, line)?
                    .first()
                    .map(|(address, _)| *address);
            }
            targets.push((line, address));
        }

        // Every line resolved; only now may the old pairs go.
        for pair in self.pairs.remove(path).unwrap_or_default() {
            flags.disarm(pair.primary);
            if pair.secondary != 0 {
                flags.disarm(pair.secondary);
            }
        }

        let mut armed = Vec::new();
        let mut resolved = Vec::with_capacity(targets.len());
        for (line, address) in targets {
            let Some(address) = address else {
                tracing::warn!(path, line, "breakpoint line has no code");
                resolved.push(ResolvedBreakpoint {
                    line,
                    verified: false,
                    address: None,
                });
                continue;
            };

            let machine = to_machine_address(address);
            let (primary, secondary) = resolve_flag_slots(machine.bank(), machine.address);
            flags.arm(primary);
            if secondary != 0 {
                flags.arm(secondary);
            }
            tracing::debug!(path, line, primary, secondary, "armed breakpoint");

            armed.push(BreakpointPair {
                path: path.to_string(),
                line,
                address,
                primary,
                secondary,
            });
            resolved.push(ResolvedBreakpoint {
                line,
                verified: true,
                address: Some(address),
            });
        }

        if !armed.is_empty() {
            self.pairs.insert(path.to_string(), armed);
        }
        Ok(resolved)
    }

    pub fn pairs_for(&self, path: &str) -> &[BreakpointPair] {
        self.pairs.get(path).map_or(&[], Vec::as_slice)
    }

    /// Breakpoints that fire for code executing at `debugger_address`.
    /// Banked code matches on its shadow slot, so a breakpoint in another bank
    /// at the same CPU address is not reported.
    pub fn breakpoints_at(&self, debugger_address: u32) -> Vec<&BreakpointPair> {
        let machine = to_machine_address(debugger_address);
        let (primary, secondary) = resolve_flag_slots(machine.bank(), machine.address);
        self.pairs
            .values()
            .flatten()
            .filter(|pair| {
                if secondary != 0 {
                    pair.secondary == secondary
                } else {
                    pair.primary == primary
                }
            })
            .collect()
    }

    /// Zeroes the whole flag array and forgets every pair.
    pub fn clear<F>(&mut self, flags: &mut F)
    where
        F: FlagMemory + ?Sized,
    {
        flags.clear_all();
        self.pairs.clear();
    }
}
