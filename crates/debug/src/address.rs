use crate::error::AddressParseError;

pub const RAM_WINDOW_START: u16 = 0xA000;
pub const ROM_WINDOW_START: u16 = 0xC000;
pub const RAM_BANK_SIZE: u32 = 0x2000;
pub const ROM_BANK_SIZE: u32 = 0x4000;

// Breakpoint flag array: the current 64K view, then every RAM bank, then
// every ROM bank.
pub const FLAG_RAM_BASE: u32 = 0x1_0000;
pub const FLAG_ROM_BASE: u32 = 0x11_0000;
pub const FLAG_ARRAY_LEN: u32 = 0x31_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Direct,
    BankedRam,
    BankedRom,
}

impl Region {
    pub fn of(address: u16) -> Self {
        if address >= ROM_WINDOW_START {
            Self::BankedRom
        } else if address >= RAM_WINDOW_START {
            Self::BankedRam
        } else {
            Self::Direct
        }
    }
}

/// CPU-visible address plus the bank registers that select it. The bank
/// that does not apply to the address's region is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MachineAddress {
    pub address: u16,
    pub ram_bank: u8,
    pub rom_bank: u8,
}

impl MachineAddress {
    pub fn region(self) -> Region {
        Region::of(self.address)
    }

    /// The bank selecting this address, 0 for direct RAM.
    pub fn bank(self) -> u8 {
        match self.region() {
            Region::Direct => 0,
            Region::BankedRam => self.ram_bank,
            Region::BankedRom => self.rom_bank,
        }
    }
}

pub fn to_debugger_address(address: u16, ram_bank: u8, rom_bank: u8) -> u32 {
    let bank = match Region::of(address) {
        Region::Direct => return u32::from(address),
        Region::BankedRam => ram_bank,
        Region::BankedRom => rom_bank,
    };
    (u32::from(bank) << 16) | u32::from(address)
}

pub fn to_machine_address(debugger_address: u32) -> MachineAddress {
    let address = (debugger_address & 0xFFFF) as u16;
    let bank = (debugger_address >> 16) as u8;
    match Region::of(address) {
        Region::Direct => MachineAddress {
            address,
            ram_bank: 0,
            rom_bank: 0,
        },
        Region::BankedRam => MachineAddress {
            address,
            ram_bank: bank,
            rom_bank: 0,
        },
        Region::BankedRom => MachineAddress {
            address,
            ram_bank: 0,
            rom_bank: bank,
        },
    }
}

/// `bb:oooo` in hex; direct addresses always show bank `00`.
pub fn format_debugger_address(debugger_address: u32) -> String {
    let machine = to_machine_address(debugger_address);
    format!("{:02X}:{:04X}", machine.bank(), machine.address)
}

/// Accepts the `bb:oooo` display form, `$hex`, `0xhex` or bare hex.
pub fn parse_debugger_address(text: &str) -> Result<u32, AddressParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AddressParseError::Empty);
    }

    if let Some((bank, offset)) = text.split_once(':') {
        let bank = parse_hex(bank, text)?;
        let offset = parse_hex(offset, text)?;
        let (Ok(bank), Ok(offset)) = (u8::try_from(bank), u16::try_from(offset)) else {
            return Err(AddressParseError::OutOfRange {
                text: text.to_string(),
            });
        };
        return Ok(to_debugger_address(offset, bank, bank));
    }

    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let value = parse_hex(digits, text)?;
    if value > 0xFF_FFFF {
        return Err(AddressParseError::OutOfRange {
            text: text.to_string(),
        });
    }
    // direct RAM has no bank bits
    let machine = to_machine_address(value);
    if machine.bank() == 0 && value > 0xFFFF {
        return Err(AddressParseError::OutOfRange {
            text: text.to_string(),
        });
    }
    Ok(value)
}

fn parse_hex(digits: &str, text: &str) -> Result<u32, AddressParseError> {
    let digits = digits.trim();
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(AddressParseError::Invalid {
            text: text.to_string(),
        });
    }
    u32::from_str_radix(digits, 16).map_err(|_| AddressParseError::OutOfRange {
        text: text.to_string(),
    })
}
