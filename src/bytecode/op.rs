use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - Instruction codes
// =============================================================================

/// Instruction code, with the discriminant fixed to the wire encoding used
/// by assembled images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    // loader directives
    Cmalloc = 0,
    Vmalloc = 1,
    Constant = 2,

    Noop = 3,
    PopOp = 4,

    // load constants and names
    LoadNull = 5,
    LoadConstant = 6,
    LoadName = 7,
    LoadNameGlobal = 8,
    LoadInt = 9,
    LoadFloat = 10,
    LoadChar = 11,

    // subscripts
    BinarySubscr = 12,
    StoreSubscr = 13,
    StoreSubscrInplace = 14,
    StoreSubscrNopop = 15,

    // store names
    StoreName = 16,
    StoreNameGlobal = 17,
    StoreNameNopop = 18,
    StoreNameGlobalNopop = 19,

    BuildArr = 20,

    // operators
    BinaryOp = 21,
    UnaryOp = 22,

    // jumps
    Jmp = 23,
    JmpTrue = 24,
    JmpFalse = 25,

    // call protocol
    Push = 26,
    Ret = 27,
    Call = 28,
    LoadGlobal = 29,
    StoreGlobal = 30,

    Halt = 31,

    // debugging
    Printk = 32,
}

impl Opcode {
    /// Decode a numeric wire code.
    pub fn from_code(code: i64) -> Option<Opcode> {
        use Opcode::*;
        Some(match code {
            0 => Cmalloc,
            1 => Vmalloc,
            2 => Constant,
            3 => Noop,
            4 => PopOp,
            5 => LoadNull,
            6 => LoadConstant,
            7 => LoadName,
            8 => LoadNameGlobal,
            9 => LoadInt,
            10 => LoadFloat,
            11 => LoadChar,
            12 => BinarySubscr,
            13 => StoreSubscr,
            14 => StoreSubscrInplace,
            15 => StoreSubscrNopop,
            16 => StoreName,
            17 => StoreNameGlobal,
            18 => StoreNameNopop,
            19 => StoreNameGlobalNopop,
            20 => BuildArr,
            21 => BinaryOp,
            22 => UnaryOp,
            23 => Jmp,
            24 => JmpTrue,
            25 => JmpFalse,
            26 => Push,
            27 => Ret,
            28 => Call,
            29 => LoadGlobal,
            30 => StoreGlobal,
            31 => Halt,
            32 => Printk,
            _ => return None,
        })
    }

    /// Resolve a textual opcode name (assembly and interactive streams).
    pub fn from_name(name: &str) -> Option<Opcode> {
        use Opcode::*;
        Some(match name {
            "CMALLOC" => Cmalloc,
            "VMALLOC" => Vmalloc,
            "CONSTANT" => Constant,
            "NOOP" => Noop,
            "POP_OP" => PopOp,
            "LOAD_NULL" => LoadNull,
            "LOAD_CONSTANT" => LoadConstant,
            "LOAD_NAME" => LoadName,
            "LOAD_NAME_GLOBAL" => LoadNameGlobal,
            "LOAD_INT" => LoadInt,
            "LOAD_FLOAT" => LoadFloat,
            "LOAD_CHAR" => LoadChar,
            "BINARY_SUBSCR" => BinarySubscr,
            "STORE_SUBSCR" => StoreSubscr,
            "STORE_SUBSCR_INPLACE" => StoreSubscrInplace,
            "STORE_SUBSCR_NOPOP" => StoreSubscrNopop,
            "STORE_NAME" => StoreName,
            "STORE_NAME_GLOBAL" => StoreNameGlobal,
            "STORE_NAME_NOPOP" => StoreNameNopop,
            "STORE_NAME_GLOBAL_NOPOP" => StoreNameGlobalNopop,
            "BUILD_ARR" => BuildArr,
            "BINARY_OP" => BinaryOp,
            "UNARY_OP" => UnaryOp,
            "JMP" => Jmp,
            "JMP_TRUE" => JmpTrue,
            "JMP_FALSE" => JmpFalse,
            "PUSH" => Push,
            "RET" => Ret,
            "CALL" => Call,
            "LOAD_GLOBAL" => LoadGlobal,
            "STORE_GLOBAL" => StoreGlobal,
            "HALT" => Halt,
            "PRINTK" => Printk,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        use Opcode::*;
        match self {
            Cmalloc => "CMALLOC",
            Vmalloc => "VMALLOC",
            Constant => "CONSTANT",
            Noop => "NOOP",
            PopOp => "POP_OP",
            LoadNull => "LOAD_NULL",
            LoadConstant => "LOAD_CONSTANT",
            LoadName => "LOAD_NAME",
            LoadNameGlobal => "LOAD_NAME_GLOBAL",
            LoadInt => "LOAD_INT",
            LoadFloat => "LOAD_FLOAT",
            LoadChar => "LOAD_CHAR",
            BinarySubscr => "BINARY_SUBSCR",
            StoreSubscr => "STORE_SUBSCR",
            StoreSubscrInplace => "STORE_SUBSCR_INPLACE",
            StoreSubscrNopop => "STORE_SUBSCR_NOPOP",
            StoreName => "STORE_NAME",
            StoreNameGlobal => "STORE_NAME_GLOBAL",
            StoreNameNopop => "STORE_NAME_NOPOP",
            StoreNameGlobalNopop => "STORE_NAME_GLOBAL_NOPOP",
            BuildArr => "BUILD_ARR",
            BinaryOp => "BINARY_OP",
            UnaryOp => "UNARY_OP",
            Jmp => "JMP",
            JmpTrue => "JMP_TRUE",
            JmpFalse => "JMP_FALSE",
            Push => "PUSH",
            Ret => "RET",
            Call => "CALL",
            LoadGlobal => "LOAD_GLOBAL",
            StoreGlobal => "STORE_GLOBAL",
            Halt => "HALT",
            Printk => "PRINTK",
        }
    }

    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Number of operand tokens following `addr opcode` in a record.
    ///
    /// `CONSTANT` carries three (kind, value, refcount) and is intercepted
    /// by the loader rather than appended as an instruction.
    pub fn operand_count(&self) -> usize {
        use Opcode::*;
        match self {
            Constant => 3,

            Cmalloc | Vmalloc | LoadConstant | LoadName | LoadNameGlobal | LoadInt | LoadFloat
            | LoadChar | StoreName | StoreNameGlobal | StoreNameNopop | StoreNameGlobalNopop
            | BuildArr | BinaryOp | UnaryOp | Jmp | JmpTrue | JmpFalse | Call => 1,

            Noop | PopOp | LoadNull | BinarySubscr | StoreSubscr | StoreSubscrInplace
            | StoreSubscrNopop | Push | Ret | LoadGlobal | StoreGlobal | Halt | Printk => 0,
        }
    }

    pub fn has_operand(&self) -> bool {
        self.operand_count() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in 0..=32 {
            let op = Opcode::from_code(code).expect("code should decode");
            assert_eq!(op.code(), code);
        }
        assert_eq!(Opcode::from_code(33), None);
        assert_eq!(Opcode::from_code(-1), None);
    }

    #[test]
    fn test_name_round_trip() {
        for code in 0..=32 {
            let op = Opcode::from_code(code).unwrap();
            assert_eq!(Opcode::from_name(op.name()), Some(op));
        }
        assert_eq!(Opcode::from_name("FROBNICATE"), None);
    }

    #[test]
    fn test_wire_codes_are_stable() {
        assert_eq!(Opcode::Cmalloc.code(), 0);
        assert_eq!(Opcode::LoadConstant.code(), 6);
        assert_eq!(Opcode::BuildArr.code(), 20);
        assert_eq!(Opcode::Halt.code(), 31);
        assert_eq!(Opcode::Printk.code(), 32);
    }

    #[test]
    fn test_operand_arity() {
        assert!(Opcode::LoadInt.has_operand());
        assert!(Opcode::Call.has_operand());
        assert!(!Opcode::Ret.has_operand());
        assert!(!Opcode::Printk.has_operand());
        assert_eq!(Opcode::Constant.operand_count(), 3);
    }
}
