use super::{Assembler, INSTRUCTION_BYTES};
use crate::{
    diag::LineError,
    encode::{BRANCH_OFFSET_MASK, CatalogEntry, IMMEDIATE_FORM, RA_SHIFT, RD_SHIFT, Size},
    expr::Pass,
    ir::Line,
};

const INDEXED: [&str; 3] = ["%21R,%V(%16R)", "%21R,(%16R)", "%21R,%V"];
const TWO_REGISTER: [&str; 2] = ["%21R,%11R", "%21R,#%V"];
const TWO_OR_THREE_REGISTER: [&str; 4] = ["%21R,%16R,%11R", "%21R,%16R,#%V", "%16R,%11R", "%16R,#%V"];
const REGISTER: [&str; 3] = ["%V(%16R)", "(%16R)", "%V"];
const BRANCH: [&str; 1] = ["%V"];

const BRANCH_MIN_OFFSET: i32 = -0x80_0000;
const BRANCH_MAX_OFFSET: i32 = 0x7F_FFFF;

/// Low half of the instruction word for a signed 16-bit displacement or
/// immediate.
fn low_half(value: i32) -> Result<u32, LineError> {
    i16::try_from(value)
        .map(|value| u32::from(value as u16))
        .map_err(|_| LineError::ValueOutOfRange)
}

/// Copies the `Ra` field into `Rd`, turning `op Ra,Rb` into `op Ra,Ra,Rb`.
fn mirror_source(opcode: u32) -> u32 {
    opcode | ((0x1F << RD_SHIFT) & (opcode << (RD_SHIFT - RA_SHIFT)))
}

impl Assembler {
    pub(super) fn inherent(&mut self, entry: &CatalogEntry) -> Result<(), LineError> {
        if self.line.size != Size::Unsized {
            return Err(LineError::IllegalSize);
        }
        self.gen_opcode(entry.opcode);
        Ok(())
    }

    /// `Rd,disp(Ra)`, `Rd,(Ra)` or `Rd,disp`.
    pub(super) fn indexed(&mut self, entry: &CatalogEntry, line: &Line<'_>) -> Result<(), LineError> {
        let (_, found) = self
            .match_operands(&INDEXED, line, entry.opcode)
            .ok_or(LineError::IllegalOperands)?;
        let displacement = low_half(found.value)?;
        self.gen_opcode(found.opcode | displacement);
        Ok(())
    }

    /// `Rd,Rb` or `Rd,#imm`.
    pub(super) fn two_register(
        &mut self,
        entry: &CatalogEntry,
        line: &Line<'_>,
    ) -> Result<(), LineError> {
        let (form, found) = self
            .match_operands(&TWO_REGISTER, line, entry.opcode)
            .ok_or(LineError::IllegalOperands)?;
        let word = match form {
            0 => found.opcode,
            _ => found.opcode | IMMEDIATE_FORM | low_half(found.value)?,
        };
        self.gen_opcode(word);
        Ok(())
    }

    /// `Rd,Ra,Rb`, `Rd,Ra,#imm`, or the two-operand forms `Ra,Rb` and
    /// `Ra,#imm` where `Ra` is also the destination.
    pub(super) fn two_or_three_register(
        &mut self,
        entry: &CatalogEntry,
        line: &Line<'_>,
    ) -> Result<(), LineError> {
        let (form, found) = self
            .match_operands(&TWO_OR_THREE_REGISTER, line, entry.opcode)
            .ok_or(LineError::IllegalOperands)?;
        let word = match form {
            0 => found.opcode,
            1 => found.opcode | IMMEDIATE_FORM | low_half(found.value)?,
            2 => mirror_source(found.opcode),
            _ => mirror_source(found.opcode | IMMEDIATE_FORM) | low_half(found.value)?,
        };
        self.gen_opcode(word);
        Ok(())
    }

    /// `disp(Ra)`, `(Ra)` or `disp`.
    pub(super) fn register_jump(
        &mut self,
        entry: &CatalogEntry,
        line: &Line<'_>,
    ) -> Result<(), LineError> {
        let (_, found) = self
            .match_operands(&REGISTER, line, entry.opcode)
            .ok_or(LineError::IllegalOperands)?;
        let displacement = low_half(found.value)?;
        self.gen_opcode(found.opcode | displacement);
        Ok(())
    }

    /// PC-relative branch. The offset counts instruction words from the
    /// following instruction.
    pub(super) fn branch(&mut self, entry: &CatalogEntry, line: &Line<'_>) -> Result<(), LineError> {
        let (_, found) = self
            .match_operands(&BRANCH, line, entry.opcode)
            .ok_or(LineError::IllegalOperands)?;

        let distance = found
            .value
            .wrapping_sub(self.pc.wrapping_add(INSTRUCTION_BYTES) as i32);
        let offset = distance / INSTRUCTION_BYTES as i32;

        // Addresses are only final in pass 2.
        if self.pass == Pass::Two {
            if distance % INSTRUCTION_BYTES as i32 != 0 {
                return Err(LineError::BranchUnreachable);
            }
            if offset < BRANCH_MIN_OFFSET {
                return Err(LineError::ValueOutOfRange);
            }
        }
        if offset > BRANCH_MAX_OFFSET {
            return Err(LineError::ValueOutOfRange);
        }

        self.gen_opcode(found.opcode | (offset as u32 & BRANCH_OFFSET_MASK));
        Ok(())
    }
}
