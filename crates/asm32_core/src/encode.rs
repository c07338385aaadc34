use crate::diag::LineError;

pub const RD_SHIFT: u32 = 21;
pub const RA_SHIFT: u32 = 16;
pub const RB_SHIFT: u32 = 11;
pub const GROUP_SHIFT: u32 = 29;
pub const ALU_OP_SHIFT: u32 = 26;
pub const CONDITION_SHIFT: u32 = 23;

/// Group 1 selects the immediate form of an ALU instruction.
pub const IMMEDIATE_FORM: u32 = 1 << GROUP_SHIFT;
pub const BRANCH_OFFSET_MASK: u32 = 0x7F_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    Inherent,
    TwoRegister,
    TwoOrThreeRegister,
    Indexed,
    Register,
    Branch,
    Org,
    Equ,
    Reg,
    Dc,
    Ds,
    Align,
    Extern,
    Global,
    Text,
    Data,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Instruction,
    Directive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Size {
    Byte,
    Word,
    Long,
    Unsized,
}

impl Size {
    /// Element width in bytes. Unsized entries never reach the sized
    /// directives, so they count as single bytes.
    pub fn bytes(self) -> u32 {
        match self {
            Size::Byte | Size::Unsized => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Size::Byte => 0x01,
            Size::Word => 0x02,
            Size::Long => 0x04,
            Size::Unsized => 0x00,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeMask(u8);

impl SizeMask {
    pub const NONE: SizeMask = SizeMask(0x00);
    pub const BYTE: SizeMask = SizeMask(0x01);
    pub const WORD: SizeMask = SizeMask(0x02);
    pub const LONG: SizeMask = SizeMask(0x04);
    pub const ANY: SizeMask = SizeMask(0x07);

    pub fn permits(self, size: Size) -> bool {
        self.0 & size.bit() != 0
    }

    /// Word, then byte, then long; unsized when nothing is permitted.
    pub fn default_size(self) -> Size {
        [Size::Word, Size::Byte, Size::Long]
            .into_iter()
            .find(|size| self.permits(*size))
            .unwrap_or(Size::Unsized)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub mnemonic: &'static str,
    pub handler: Handler,
    pub sizes: SizeMask,
    pub opcode: u32,
    pub kind: EntryKind,
}

const fn directive(mnemonic: &'static str, handler: Handler, sizes: SizeMask) -> CatalogEntry {
    CatalogEntry {
        mnemonic,
        handler,
        sizes,
        opcode: 0,
        kind: EntryKind::Directive,
    }
}

const fn instruction(
    mnemonic: &'static str,
    handler: Handler,
    sizes: SizeMask,
    opcode: u32,
) -> CatalogEntry {
    CatalogEntry {
        mnemonic,
        handler,
        sizes,
        opcode,
        kind: EntryKind::Instruction,
    }
}

const fn alu(op: u32) -> u32 {
    op << ALU_OP_SHIFT
}

const fn branch(condition: u32) -> u32 {
    0x8000_0000 | (condition << CONDITION_SHIFT)
}

static CATALOG: &[CatalogEntry] = &[
    directive("ORG", Handler::Org, SizeMask::NONE),
    directive("EQU", Handler::Equ, SizeMask::NONE),
    directive("REG", Handler::Reg, SizeMask::NONE),
    directive("DC", Handler::Dc, SizeMask::ANY),
    directive("BYTE", Handler::Dc, SizeMask::BYTE),
    directive("WORD", Handler::Dc, SizeMask::WORD),
    directive("LONG", Handler::Dc, SizeMask::LONG),
    directive("ASCII", Handler::Dc, SizeMask::BYTE),
    directive("DS", Handler::Ds, SizeMask::ANY),
    directive("BLOCK", Handler::Ds, SizeMask::BYTE),
    directive("RMB", Handler::Ds, SizeMask::BYTE),
    directive("ALIGN", Handler::Align, SizeMask::ANY),
    directive("EXTERN", Handler::Extern, SizeMask::NONE),
    directive("XREF", Handler::Extern, SizeMask::NONE),
    directive("GLOBAL", Handler::Global, SizeMask::NONE),
    directive("XDEF", Handler::Global, SizeMask::NONE),
    directive("TEXT", Handler::Text, SizeMask::NONE),
    directive("DATA", Handler::Data, SizeMask::NONE),
    directive("END", Handler::End, SizeMask::NONE),
    instruction("RTS", Handler::Inherent, SizeMask::NONE, 0x4000_0000 | (31 << RA_SHIFT)),
    instruction("MOV", Handler::TwoRegister, SizeMask::NONE, alu(0)),
    instruction("MOVH", Handler::TwoRegister, SizeMask::NONE, alu(5)),
    instruction("SWAP", Handler::TwoRegister, SizeMask::NONE, alu(5)),
    instruction("ADD", Handler::TwoOrThreeRegister, SizeMask::NONE, alu(0)),
    instruction("SUB", Handler::TwoOrThreeRegister, SizeMask::NONE, alu(1)),
    instruction("AND", Handler::TwoOrThreeRegister, SizeMask::NONE, alu(2)),
    instruction("OR", Handler::TwoOrThreeRegister, SizeMask::NONE, alu(3)),
    instruction("EOR", Handler::TwoOrThreeRegister, SizeMask::NONE, alu(4)),
    instruction("XOR", Handler::TwoOrThreeRegister, SizeMask::NONE, alu(4)),
    instruction("MUL", Handler::TwoOrThreeRegister, SizeMask::NONE, alu(7)),
    instruction("LD", Handler::Indexed, SizeMask::ANY, 0x4000_0000),
    instruction("ST", Handler::Indexed, SizeMask::ANY, 0x6000_0000),
    instruction("JMP", Handler::Register, SizeMask::NONE, 0x4000_0000),
    instruction("BRA", Handler::Branch, SizeMask::NONE, branch(0x0)),
    instruction("BSR", Handler::Branch, SizeMask::NONE, branch(0x1)),
    instruction("BCS", Handler::Branch, SizeMask::NONE, branch(0x2)),
    instruction("BLO", Handler::Branch, SizeMask::NONE, branch(0x2)),
    instruction("BCC", Handler::Branch, SizeMask::NONE, branch(0x3)),
    instruction("BHS", Handler::Branch, SizeMask::NONE, branch(0x3)),
    instruction("BEQ", Handler::Branch, SizeMask::NONE, branch(0x4)),
    instruction("BNE", Handler::Branch, SizeMask::NONE, branch(0x5)),
    instruction("BVS", Handler::Branch, SizeMask::NONE, branch(0x6)),
    instruction("BVC", Handler::Branch, SizeMask::NONE, branch(0x7)),
    instruction("BMI", Handler::Branch, SizeMask::NONE, branch(0x8)),
    instruction("BPL", Handler::Branch, SizeMask::NONE, branch(0x9)),
    instruction("BLT", Handler::Branch, SizeMask::NONE, branch(0xA)),
    instruction("BGE", Handler::Branch, SizeMask::NONE, branch(0xB)),
    instruction("BLE", Handler::Branch, SizeMask::NONE, branch(0xC)),
    instruction("BGT", Handler::Branch, SizeMask::NONE, branch(0xD)),
    instruction("BLS", Handler::Branch, SizeMask::NONE, branch(0xE)),
    instruction("BHI", Handler::Branch, SizeMask::NONE, branch(0xF)),
];

pub fn catalog() -> &'static [CatalogEntry] {
    CATALOG
}

/// Finds the catalog entry for `text`, which may carry a `.B`, `.W` or `.L`
/// size suffix. Lookup ignores case and returns the first entry in table
/// order.
pub fn lookup_mnemonic(text: &str) -> Result<(&'static CatalogEntry, Size), LineError> {
    let (base, suffix) = match text.split_once('.') {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (text, None),
    };

    let requested = match suffix {
        None => None,
        Some(suffix) => Some(match suffix {
            "B" | "b" => Size::Byte,
            "W" | "w" => Size::Word,
            "L" | "l" => Size::Long,
            _ => return Err(LineError::IllegalSize),
        }),
    };

    let entry = CATALOG
        .iter()
        .find(|entry| entry.mnemonic.eq_ignore_ascii_case(base))
        .ok_or(LineError::UnknownMnemonic)?;

    let size = match requested {
        None => entry.sizes.default_size(),
        Some(size) if entry.sizes.permits(size) => size,
        Some(_) => return Err(LineError::IllegalSize),
    };
    Ok((entry, size))
}

const ALU_NAMES: [&str; 8] = ["add", "sub", "and", "or", "xor", "swap", "--", "mul"];
const CONDITION_NAMES: [&str; 16] = [
    "Bra", "Bsr", "Bcs", "Bcc", "Beq", "Bne", "Bvs", "Bvc", "Bmi", "Bpl", "Blt", "Bge", "Ble",
    "Bgt", "Bls", "Bhi",
];

fn reg(word: u32, shift: u32) -> u32 {
    (word >> shift) & 0x1F
}

/// Human-readable form of an instruction word, printed as a listing comment.
pub fn disassemble(word: u32) -> Option<String> {
    let alu_name = ALU_NAMES[((word >> ALU_OP_SHIFT) & 0x7) as usize];
    let rd = reg(word, RD_SHIFT);
    let ra = reg(word, RA_SHIFT);
    let displacement = (word & 0xFFFF) as u16 as i16;

    let text = match word >> GROUP_SHIFT {
        0 => format!(
            "; {alu_name:<5} R{rd:<2},R{ra:<2},R{:<2}",
            reg(word, RB_SHIFT)
        ),
        1 => format!("; {alu_name:<5} R{rd:<2},R{ra:<2},#{}", word & 0xFFFF),
        2 if rd == 0 => format!("; Jmp {displacement}(R{ra:<2})"),
        2 => format!("; Ld R{rd:<2},{displacement}(R{ra:<2})"),
        3 => format!("; St R{rd:<2},R{ra:<2},#{}", word & 0xFFFF),
        4 => {
            let mut offset = word & BRANCH_OFFSET_MASK;
            if offset & (1 << 22) != 0 {
                offset |= 0xFFC0_0000;
            }
            let name = CONDITION_NAMES[((word >> CONDITION_SHIFT) & 0xF) as usize];
            format!(
                "; {name} #{} ({offset:X})",
                (offset as i32).wrapping_mul(4)
            )
        }
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_with_default_sizes() {
        let (entry, size) = lookup_mnemonic("add").expect("ADD");
        assert_eq!(entry.handler, Handler::TwoOrThreeRegister);
        assert_eq!(size, Size::Unsized);

        let (entry, size) = lookup_mnemonic("Dc").expect("DC");
        assert_eq!(entry.handler, Handler::Dc);
        assert_eq!(size, Size::Word);

        let (_, size) = lookup_mnemonic("ascii").expect("ASCII");
        assert_eq!(size, Size::Byte);

        let (_, size) = lookup_mnemonic("LONG").expect("LONG");
        assert_eq!(size, Size::Long);
    }

    #[test]
    fn size_suffixes() {
        let (_, size) = lookup_mnemonic("DC.l").expect("DC.L");
        assert_eq!(size, Size::Long);
        let (_, size) = lookup_mnemonic("LD.B").expect("LD.B");
        assert_eq!(size, Size::Byte);

        assert_eq!(lookup_mnemonic("ADD.W"), Err(LineError::IllegalSize));
        assert_eq!(lookup_mnemonic("BYTE.W"), Err(LineError::IllegalSize));
        assert_eq!(lookup_mnemonic("DC.Q"), Err(LineError::IllegalSize));
        assert_eq!(lookup_mnemonic("DC.BW"), Err(LineError::IllegalSize));
    }

    #[test]
    fn unknown_mnemonics() {
        assert_eq!(lookup_mnemonic("FROB"), Err(LineError::UnknownMnemonic));
        assert_eq!(lookup_mnemonic("FROB.L"), Err(LineError::UnknownMnemonic));
    }

    #[test]
    fn aliases_share_opcodes() {
        let opcode = |name: &str| lookup_mnemonic(name).expect(name).0.opcode;
        assert_eq!(opcode("BLO"), opcode("BCS"));
        assert_eq!(opcode("BHS"), opcode("BCC"));
        assert_eq!(opcode("XOR"), opcode("EOR"));
        assert_eq!(opcode("SWAP"), opcode("MOVH"));
        assert_eq!(opcode("RTS"), 0x401F_0000);
        assert_eq!(opcode("BHI"), 0x8780_0000);
    }

    #[test]
    fn disassembles_each_group() {
        assert_eq!(
            disassemble(0x0022_1800).as_deref(),
            Some("; add   R1 ,R2 ,R3 ")
        );
        assert_eq!(
            disassemble(0x2421_0001).as_deref(),
            Some("; sub   R1 ,R1 ,#1")
        );
        assert_eq!(disassemble(0x401F_0000).as_deref(), Some("; Jmp 0(R31)"));
        assert_eq!(
            disassemble(0x4041_FFFC).as_deref(),
            Some("; Ld R2 ,-4(R1 )")
        );
        assert_eq!(
            disassemble(0x6043_0008).as_deref(),
            Some("; St R2 ,R3 ,#8")
        );
        assert_eq!(
            disassemble(0x63E3_FFF8).as_deref(),
            Some("; St R31,R3 ,#65528")
        );
        assert_eq!(
            disassemble(0x807F_FFFE).as_deref(),
            Some("; Bra #-8 (FFFFFFFE)")
        );
        assert_eq!(disassemble(0xA000_0000), None);
    }
}
