//! Debugger-side view of a Commander X16 program: banked address
//! translation, the source graph that links generated files back to what
//! produced them, the address index built from compiled output, and the
//! breakpoint flags shared with the emulator.

mod address;
mod breakpoints;
mod error;
mod source;
mod source_map;

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};

pub use self::address::{
    FLAG_ARRAY_LEN, FLAG_RAM_BASE, FLAG_ROM_BASE, MachineAddress, RAM_BANK_SIZE,
    RAM_WINDOW_START, ROM_BANK_SIZE, ROM_WINDOW_START, Region, format_debugger_address,
    parse_debugger_address, to_debugger_address, to_machine_address,
};
pub use self::breakpoints::{
    BreakpointCoordinator, BreakpointPair, FlagMemory, ResolvedBreakpoint, resolve_flag_slots,
};
pub use self::error::{AddressParseError, SourceMapError};
pub use self::source::{AddressBinding, LineRef, SourceFile, SourceGraph, SourceId};
pub use self::source_map::{DEFAULT_BACK_STEP, OutputLine, SourceMapIndex};
