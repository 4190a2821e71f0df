use crate::bytecode::Instruct;
use crate::lang::value::SlotRef;
use std::collections::HashMap;

/// The decoded program: the ordered instruction list, the address map that
/// resolves jump and call targets, the constant pool, and the global
/// variable area.
pub struct ProgramImage {
    instructs: Vec<Instruct>,
    addrs: HashMap<i64, usize>,
    constants: Vec<Option<SlotRef>>,
    pub globals: Vec<Option<SlotRef>>,
}

impl ProgramImage {
    pub fn new() -> Self {
        Self {
            instructs: Vec::new(),
            addrs: HashMap::new(),
            constants: Vec::new(),
            globals: Vec::new(),
        }
    }

    /// Ordered append. The instruction's address becomes resolvable as a
    /// jump or call target; a duplicate address rebinds to the later
    /// instruction.
    pub fn append(&mut self, ins: Instruct) {
        self.addrs.insert(ins.addr, self.instructs.len());
        self.instructs.push(ins);
    }

    pub fn fetch(&self, index: usize) -> Option<Instruct> {
        self.instructs.get(index).copied()
    }

    pub fn index_of(&self, addr: i64) -> Option<usize> {
        self.addrs.get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.instructs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructs.is_empty()
    }

    /// Reserve `n` constant slots. Replaces any previous pool.
    pub fn constant_pool_alloc(&mut self, n: usize) {
        self.constants = vec![None; n];
    }

    /// Place a pre-built constant. Returns false if the pool has no cell
    /// at `index`. The pool's own handle keeps the constant alive across
    /// any number of `LOAD_CONSTANT`s.
    pub fn install_constant(&mut self, index: usize, slot: SlotRef) -> bool {
        match self.constants.get_mut(index) {
            Some(cell) => {
                *cell = Some(slot);
                true
            }
            None => false,
        }
    }

    /// Acquire the constant at `index`, if installed.
    pub fn constant(&self, index: usize) -> Option<SlotRef> {
        self.constants.get(index).cloned().flatten()
    }

    /// One-shot allocation of `n` null-initialised global holders.
    pub fn globals_alloc(&mut self, n: usize) {
        self.globals = vec![None; n];
    }

    /// Drop everything: instructions, address map, constants and globals.
    /// Dropping the pool and the globals releases every held value.
    pub fn reset(&mut self) {
        self.instructs.clear();
        self.addrs.clear();
        self.constants.clear();
        self.globals.clear();
    }
}

impl Default for ProgramImage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Opcode;
    use crate::lang::value::Slot;

    #[test]
    fn test_append_records_address() {
        let mut image = ProgramImage::new();
        image.append(Instruct::new(100, Opcode::LoadInt, 1));
        image.append(Instruct::plain(250, Opcode::Halt));

        assert_eq!(image.len(), 2);
        assert_eq!(image.index_of(100), Some(0));
        assert_eq!(image.index_of(250), Some(1));
        assert_eq!(image.index_of(7), None);
        assert_eq!(image.fetch(1).unwrap().op, Opcode::Halt);
    }

    #[test]
    fn test_constant_pool() {
        let mut image = ProgramImage::new();
        image.constant_pool_alloc(2);

        assert!(image.install_constant(1, Slot::float(2.5)));
        assert!(!image.install_constant(2, Slot::int(0)));

        assert!(image.constant(0).is_none());
        let c = image.constant(1).unwrap();
        assert_eq!(*c.borrow(), Slot::Float(2.5));
    }

    #[test]
    fn test_globals_alloc_null_initialised() {
        let mut image = ProgramImage::new();
        image.globals_alloc(3);
        assert_eq!(image.globals.len(), 3);
        assert!(image.globals.iter().all(|g| g.is_none()));
    }
}
