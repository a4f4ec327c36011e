//! Configuration register file
//!
//! The host reads and writes device configuration as a flat table of
//! `{id, value}` registers: SetConfig carries a batch of pairs to write,
//! GetCompleteConfig returns the whole table. Register semantics live in the
//! state machine; this module is pure data.

/// Acquisition mode: 0 = idle, 1 = acquiring
pub const REG_ACQUISITION_MODE: u32 = 1;
/// Trigger mode: 0 = internal (software), 1 = external (hardware)
pub const REG_TRIGGER_MODE: u32 = 2;
/// Shutter exposure time in microseconds
pub const REG_EXPOSURE_TIME: u32 = 3;

/// Wire size of one `{id, value}` register pair
pub const REG_PAIR_SIZE: usize = 8;

/// One configuration register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub id: u32,
    pub value: u32,
}

/// Ordered register table with unique ids
#[derive(Debug, Clone)]
pub struct RegisterFile {
    regs: Vec<Register>,
}

impl RegisterFile {
    /// Register table with power-on defaults: idle, internal trigger,
    /// and the exposure time taken from the configuration file.
    pub fn new(exposure_us: u32) -> Self {
        Self {
            regs: vec![
                Register {
                    id: REG_ACQUISITION_MODE,
                    value: 0,
                },
                Register {
                    id: REG_TRIGGER_MODE,
                    value: 0,
                },
                Register {
                    id: REG_EXPOSURE_TIME,
                    value: exposure_us,
                },
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// Current value of a register, None for an unknown id
    pub fn get(&self, id: u32) -> Option<u32> {
        self.regs.iter().find(|r| r.id == id).map(|r| r.value)
    }

    /// Update a register value. Returns false for an unknown id.
    pub fn set(&mut self, id: u32, value: u32) -> bool {
        match self.regs.iter_mut().find(|r| r.id == id) {
            Some(reg) => {
                reg.value = value;
                true
            }
            None => false,
        }
    }

    /// Registers in table order
    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.regs.iter()
    }

    /// Encode the whole table as consecutive `{id, value}` pairs
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.regs.len() * REG_PAIR_SIZE);
        for reg in &self.regs {
            buf.extend_from_slice(&reg.id.to_le_bytes());
            buf.extend_from_slice(&reg.value.to_le_bytes());
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let regs = RegisterFile::new(15_000);
        assert_eq!(regs.len(), 3);
        assert_eq!(regs.get(REG_ACQUISITION_MODE), Some(0));
        assert_eq!(regs.get(REG_TRIGGER_MODE), Some(0));
        assert_eq!(regs.get(REG_EXPOSURE_TIME), Some(15_000));
    }

    #[test]
    fn test_set_known_and_unknown() {
        let mut regs = RegisterFile::new(15_000);
        assert!(regs.set(REG_EXPOSURE_TIME, 441));
        assert_eq!(regs.get(REG_EXPOSURE_TIME), Some(441));
        assert!(!regs.set(0xFF, 1));
        assert_eq!(regs.get(0xFF), None);
    }

    #[test]
    fn test_encode_length_and_order() {
        let regs = RegisterFile::new(15_000);
        let buf = regs.encode();
        assert_eq!(buf.len(), regs.len() * REG_PAIR_SIZE);
        // First pair is the acquisition mode register
        assert_eq!(&buf[0..4], &REG_ACQUISITION_MODE.to_le_bytes());
        assert_eq!(&buf[4..8], &[0, 0, 0, 0]);
    }
}
