use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a slot.
///
/// Acquiring a value means cloning its handle; releasing it means dropping
/// one. The payload is freed when the last handle goes away, and an array
/// cascades the release to every element it owns.
pub type SlotRef = Rc<RefCell<Slot>>;

/// Kind tag for a slot payload.
///
/// The numeric order matches the wire encoding used by the `BUILD_ARR` and
/// `CONSTANT` kind immediates: 0 = Int, 1 = Float, 2 = Char. Void and Array
/// have no wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Int,
    Float,
    Char,
    Void,
    Array,
}

impl Kind {
    /// Decode a kind immediate. Only the scalar kinds are encodable.
    pub fn from_code(code: i64) -> Option<Kind> {
        match code {
            0 => Some(Kind::Int),
            1 => Some(Kind::Float),
            2 => Some(Kind::Char),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Char => "char",
            Kind::Void => "void",
            Kind::Array => "array",
        }
    }
}

/// Runtime value carried on an operand stack, bound in a variable cell, or
/// held in the constant pool.
#[derive(Debug, PartialEq)]
pub enum Slot {
    /// 64-bit signed integer.
    Int(i64),

    /// Double-precision float.
    Float(f64),

    /// Single 8-bit character.
    Char(u8),

    /// Fixed-length array of slots behind one shared backing store.
    ///
    /// Element slots are owned by the array. Every handle to the array
    /// observes subscript writes made through any other handle.
    Array { elem: Kind, items: Vec<SlotRef> },

    /// The null value.
    Void,
}

impl Slot {
    pub fn int(v: i64) -> SlotRef {
        Rc::new(RefCell::new(Slot::Int(v)))
    }

    pub fn float(v: f64) -> SlotRef {
        Rc::new(RefCell::new(Slot::Float(v)))
    }

    pub fn chr(v: u8) -> SlotRef {
        Rc::new(RefCell::new(Slot::Char(v)))
    }

    pub fn null() -> SlotRef {
        Rc::new(RefCell::new(Slot::Void))
    }

    /// Build a `len`-element array whose elements are the zero value of
    /// `elem`. Arrays do not nest and cannot hold void, so those element
    /// kinds are rejected.
    pub fn array(len: usize, elem: Kind) -> Option<SlotRef> {
        let items: Vec<SlotRef> = match elem {
            Kind::Int => (0..len).map(|_| Slot::int(0)).collect(),
            Kind::Float => (0..len).map(|_| Slot::float(0.0)).collect(),
            Kind::Char => (0..len).map(|_| Slot::chr(0)).collect(),
            Kind::Void | Kind::Array => return None,
        };
        Some(Rc::new(RefCell::new(Slot::Array { elem, items })))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Slot::Int(_) => Kind::Int,
            Slot::Float(_) => Kind::Float,
            Slot::Char(_) => Kind::Char,
            Slot::Array { .. } => Kind::Array,
            Slot::Void => Kind::Void,
        }
    }

    /// Int payload of the slot, or 0 for any other kind.
    ///
    /// `JMP_TRUE` / `JMP_FALSE` branch on this, and `BUILD_ARR` and
    /// `BINARY_SUBSCR` read lengths and indices through it.
    pub fn int_value(&self) -> i64 {
        match self {
            Slot::Int(n) => *n,
            _ => 0,
        }
    }
}

impl fmt::Display for Slot {
    /// Short debug rendering: `N(int)`, `X(float)`, `C(char)`, `array[N]`,
    /// `(null)`. Floats print in their shortest form, so `6.0` renders as
    /// `6(float)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Int(n) => write!(f, "{}(int)", n),
            Slot::Float(x) => write!(f, "{}(float)", x),
            Slot::Char(c) => write!(f, "{}(char)", *c as char),
            Slot::Array { items, .. } => write!(f, "array[{}]", items.len()),
            Slot::Void => write!(f, "(null)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_int() {
        assert_eq!(Slot::Int(42).to_string(), "42(int)");
        assert_eq!(Slot::Int(-7).to_string(), "-7(int)");
    }

    #[test]
    fn test_render_float_shortest_form() {
        assert_eq!(Slot::Float(6.0).to_string(), "6(float)");
        assert_eq!(Slot::Float(2.5).to_string(), "2.5(float)");
    }

    #[test]
    fn test_render_char() {
        assert_eq!(Slot::Char(b'a').to_string(), "a(char)");
    }

    #[test]
    fn test_render_null() {
        assert_eq!(Slot::Void.to_string(), "(null)");
    }

    #[test]
    fn test_render_array() {
        let arr = Slot::array(3, Kind::Int).unwrap();
        assert_eq!(arr.borrow().to_string(), "array[3]");
    }

    #[test]
    fn test_array_zero_filled() {
        let arr = Slot::array(4, Kind::Float).unwrap();
        if let Slot::Array { elem, items } = &*arr.borrow() {
            assert_eq!(*elem, Kind::Float);
            assert_eq!(items.len(), 4);
            for item in items {
                assert_eq!(*item.borrow(), Slot::Float(0.0));
            }
        } else {
            panic!("expected array slot");
        };
    }

    #[test]
    fn test_array_rejects_nested_and_void_elements() {
        assert!(Slot::array(2, Kind::Array).is_none());
        assert!(Slot::array(2, Kind::Void).is_none());
    }

    #[test]
    fn test_array_handles_share_interior() {
        let a = Slot::array(2, Kind::Int).unwrap();
        let b = Rc::clone(&a);

        if let Slot::Array { items, .. } = &*a.borrow() {
            *items[1].borrow_mut() = Slot::Int(42);
        }

        if let Slot::Array { items, .. } = &*b.borrow() {
            assert_eq!(*items[1].borrow(), Slot::Int(42));
        } else {
            panic!("expected array slot");
        };
    }

    #[test]
    fn test_int_value_of_non_int_is_zero() {
        assert_eq!(Slot::Int(9).int_value(), 9);
        assert_eq!(Slot::Float(9.0).int_value(), 0);
        assert_eq!(Slot::Void.int_value(), 0);
    }

    #[test]
    fn test_kind_from_code() {
        assert_eq!(Kind::from_code(0), Some(Kind::Int));
        assert_eq!(Kind::from_code(1), Some(Kind::Float));
        assert_eq!(Kind::from_code(2), Some(Kind::Char));
        assert_eq!(Kind::from_code(3), None);
        assert_eq!(Kind::from_code(-1), None);
    }
}
