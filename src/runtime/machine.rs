use crate::bytecode::{Instruct, Opcode};
use crate::lang::value::{Kind, Slot, SlotRef};
use crate::runtime::frame::Frame;
use crate::runtime::image::ProgramImage;
use crate::runtime::runtime_error::{
    array_expected, call_depth_exceeded, division_by_zero, invalid_element_kind, kind_mismatch,
    modulo_by_zero, negative_allocation, no_active_frame, stack_overflow, stack_underflow,
    subscript_out_of_bounds, unbound_variable, unknown_operator, unmapped_address, unset_constant,
    variable_out_of_range, VmError,
};
use std::io::{self, Write};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Capacity of each operand stack, the global one and each frame's.
    pub max_operand_stack: usize,
    /// Maximum depth of the frame chain.
    pub max_call_depth: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            max_operand_stack: 2000,
            max_call_depth: 1000,
        }
    }
}

/// The virtual machine: program image, frame chain, global operand stack,
/// and the dispatch loop.
///
/// The active operand stack is the top frame's when a frame exists and the
/// global one otherwise; every stack accessor resolves through that rule,
/// so `PUSH` and `RET` re-bind it implicitly.
pub struct Machine {
    image: ProgramImage,
    frames: Vec<Frame>,
    global_operands: Vec<SlotRef>,
    ip: i64,
    /// The one null value. `LOAD_NULL` hands out clones of this handle; the
    /// payload itself lives as long as the machine.
    null: SlotRef,
    config: MachineConfig,
    verbose: bool,
    out: Box<dyn Write>,
}

impl Machine {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self {
            image: ProgramImage::new(),
            frames: Vec::new(),
            global_operands: Vec::new(),
            ip: -1,
            null: Slot::null(),
            config,
            verbose: false,
            out: Box::new(io::stdout()),
        }
    }

    pub fn enable_verbose(&mut self) {
        self.verbose = true;
    }

    /// Redirect `PRINTK` and trace output, e.g. into a buffer.
    #[allow(dead_code)]
    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    pub fn add_instruct(&mut self, ins: Instruct) {
        self.image.append(ins);
    }

    pub fn constant_pool_alloc(&mut self, n: usize) {
        self.image.constant_pool_alloc(n);
    }

    /// Place a loader-built constant. False if the pool has no such cell.
    pub fn install_constant(&mut self, index: usize, slot: SlotRef) -> bool {
        self.image.install_constant(index, slot)
    }

    #[allow(dead_code)]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    #[allow(dead_code)]
    pub fn image(&self) -> &ProgramImage {
        &self.image
    }

    #[allow(dead_code)]
    pub fn global_operands(&self) -> &[SlotRef] {
        &self.global_operands
    }

    /// Drop the frame chain, both operand stacks, the globals, the constant
    /// pool and the instructions. Every value still held anywhere is
    /// released here.
    #[allow(dead_code)]
    pub fn reset(&mut self) {
        self.ip = -1;
        self.frames.clear();
        self.global_operands.clear();
        self.image.reset();
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Execute from the current instruction pointer until `HALT` or the end
    /// of the instruction list. In interactive use the machine keeps its
    /// state across calls, so a later dispatch resumes where the last one
    /// halted.
    pub fn dispatch(&mut self) -> Result<(), VmError> {
        if self.verbose {
            writeln!(self.out, "SLang Virtual Machine Debugger (SVMDB)").ok();
            writeln!(self.out, "I am an opcode-level debugging assistant.").ok();
            writeln!(self.out, "======================================").ok();
            wait_for_enter();
        }

        loop {
            self.ip += 1;
            let ins = match self.image.fetch(self.ip as usize) {
                Some(ins) => ins,
                None => {
                    // leave ip on the last executed instruction, so an
                    // interactive session resumes with records appended
                    // after this dispatch
                    self.ip -= 1;
                    break;
                }
            };

            if self.verbose {
                writeln!(self.out, "======================================").ok();
                if ins.op.has_operand() {
                    write!(self.out, "#{} $ {} {} > ", ins.addr, ins.op.name(), ins.operand).ok();
                } else {
                    write!(self.out, "#{} $ {} > ", ins.addr, ins.op.name()).ok();
                }
                self.out.flush().ok();
                wait_for_enter();
            }

            match ins.op {
                Opcode::Noop => {}

                Opcode::Cmalloc => {
                    let n = usize::try_from(ins.operand)
                        .map_err(|_| negative_allocation("CMALLOC", ins.operand))?;
                    self.image.constant_pool_alloc(n);
                }

                // CONSTANT records are consumed by the loader; one reaching
                // the dispatch loop carries nothing to execute.
                Opcode::Constant => {}

                Opcode::Vmalloc => {
                    let n = usize::try_from(ins.operand)
                        .map_err(|_| negative_allocation("VMALLOC", ins.operand))?;
                    match self.frames.last_mut() {
                        Some(frame) => frame.locals = vec![None; n],
                        None => self.image.globals_alloc(n),
                    }
                }

                Opcode::PopOp => {
                    self.pop_operand()?;
                }

                Opcode::LoadNull => {
                    let null = Rc::clone(&self.null);
                    self.push_operand(null)?;
                }

                Opcode::LoadInt => self.push_operand(Slot::int(ins.operand))?,

                // The wire operand is an integer; fractional floats must
                // come through the constant pool.
                Opcode::LoadFloat => self.push_operand(Slot::float(ins.operand as f64))?,

                Opcode::LoadChar => self.push_operand(Slot::chr(ins.operand as u8))?,

                Opcode::LoadConstant => {
                    let slot = usize::try_from(ins.operand)
                        .ok()
                        .and_then(|i| self.image.constant(i))
                        .ok_or_else(|| unset_constant(ins.operand))?;
                    self.push_operand(slot)?;
                }

                Opcode::LoadName => {
                    let slot = {
                        let frame = self
                            .frames
                            .last()
                            .ok_or_else(|| no_active_frame("LOAD_NAME"))?;
                        load_cell(&frame.locals, "local", ins.operand)?
                    };
                    self.push_operand(slot)?;
                }

                Opcode::LoadNameGlobal => {
                    let slot = load_cell(&self.image.globals, "global", ins.operand)?;
                    self.push_operand(slot)?;
                }

                Opcode::StoreName | Opcode::StoreNameNopop => {
                    // STORE_NAME transfers the popped handle; the NOPOP form
                    // leaves the stack alone and acquires a second handle.
                    let value = if ins.op == Opcode::StoreName {
                        self.pop_operand()?
                    } else {
                        self.peek_operand()?
                    };
                    let frame = self
                        .frames
                        .last_mut()
                        .ok_or_else(|| no_active_frame(ins.op.name()))?;
                    store_cell(&mut frame.locals, "local", ins.operand, value)?;
                }

                Opcode::StoreNameGlobal | Opcode::StoreNameGlobalNopop => {
                    let value = if ins.op == Opcode::StoreNameGlobal {
                        self.pop_operand()?
                    } else {
                        self.peek_operand()?
                    };
                    store_cell(&mut self.image.globals, "global", ins.operand, value)?;
                }

                Opcode::BuildArr => {
                    let elem = Kind::from_code(ins.operand)
                        .ok_or_else(|| invalid_element_kind(ins.operand))?;
                    let len_slot = self.pop_operand()?;
                    let len = require_int(&len_slot, "BUILD_ARR length")?;
                    let len = usize::try_from(len)
                        .map_err(|_| negative_allocation("BUILD_ARR", len))?;
                    let array =
                        Slot::array(len, elem).ok_or_else(|| invalid_element_kind(ins.operand))?;
                    self.push_operand(array)?;
                }

                Opcode::BinarySubscr => {
                    let index_slot = self.pop_operand()?;
                    let array_slot = self.pop_operand()?;
                    let index = require_int(&index_slot, "subscript index")?;
                    let element = {
                        let guard = array_slot.borrow();
                        let items = match &*guard {
                            Slot::Array { items, .. } => items,
                            other => return Err(array_expected(other.kind())),
                        };
                        let cell = usize::try_from(index)
                            .ok()
                            .and_then(|i| items.get(i))
                            .ok_or_else(|| subscript_out_of_bounds(index, items.len()))?;
                        Rc::clone(cell)
                    };
                    self.push_operand(element)?;
                    // index and array handles drop here: one release each
                }

                Opcode::StoreSubscr | Opcode::StoreSubscrInplace | Opcode::StoreSubscrNopop => {
                    let value = self.pop_operand()?;
                    let index_slot = self.pop_operand()?;
                    let array_slot = self.peek_operand()?;
                    let index = require_int(&index_slot, "subscript index")?;
                    {
                        let guard = array_slot.borrow();
                        let (elem, items) = match &*guard {
                            Slot::Array { elem, items } => (*elem, items),
                            other => return Err(array_expected(other.kind())),
                        };
                        let cell = usize::try_from(index)
                            .ok()
                            .and_then(|i| items.get(i))
                            .ok_or_else(|| subscript_out_of_bounds(index, items.len()))?;
                        // overwrite the element's payload in place, so every
                        // alias of the element observes the store
                        let payload = match (elem, &*value.borrow()) {
                            (Kind::Int, Slot::Int(n)) => Slot::Int(*n),
                            (Kind::Float, Slot::Float(x)) => Slot::Float(*x),
                            (Kind::Char, Slot::Char(c)) => Slot::Char(*c),
                            (expected, got) => {
                                return Err(kind_mismatch("subscript store", expected, got.kind()))
                            }
                        };
                        *cell.borrow_mut() = payload;
                    }
                    match ins.op {
                        Opcode::StoreSubscr => {
                            self.pop_operand()?;
                        }
                        Opcode::StoreSubscrNopop => {
                            self.pop_operand()?;
                            self.push_operand(value)?;
                        }
                        // INPLACE leaves the array on the stack
                        _ => {}
                    }
                }

                Opcode::Jmp => self.jump_to(ins.operand)?,

                Opcode::JmpTrue => {
                    let cond = self.pop_operand()?;
                    let taken = cond.borrow().int_value() != 0;
                    if taken {
                        self.jump_to(ins.operand)?;
                    }
                }

                Opcode::JmpFalse => {
                    let cond = self.pop_operand()?;
                    let taken = cond.borrow().int_value() == 0;
                    if taken {
                        self.jump_to(ins.operand)?;
                    }
                }

                Opcode::UnaryOp => self.exec_unary(ins.operand)?,

                Opcode::BinaryOp => {
                    let right = self.pop_operand()?;
                    let left = self.pop_operand()?;
                    let result = {
                        let l = left.borrow();
                        let r = right.borrow();
                        self.eval_binary(ins.operand, &l, &r)?
                    };
                    self.push_operand(result)?;
                }

                Opcode::Push => {
                    if self.frames.len() >= self.config.max_call_depth {
                        return Err(call_depth_exceeded(self.config.max_call_depth));
                    }
                    self.frames.push(Frame::new());
                    if self.verbose {
                        writeln!(self.out, "Frame pushed onto the control stack.").ok();
                    }
                }

                Opcode::Call => {
                    let return_ip = (self.ip + 1) as usize;
                    let frame = self
                        .frames
                        .last_mut()
                        .ok_or_else(|| no_active_frame("CALL"))?;
                    frame.return_ip = return_ip;
                    self.jump_to(ins.operand)?;
                    if self.verbose {
                        writeln!(
                            self.out,
                            "Calling subroutine at address {}.",
                            ins.operand
                        )
                        .ok();
                    }
                }

                Opcode::Ret => {
                    let mut frame = self.frames.pop().ok_or_else(|| no_active_frame("RET"))?;
                    // the return value moves to the caller's stack: one
                    // handle, no refcount change
                    let result = frame.operands.pop().ok_or_else(stack_underflow)?;
                    self.ip = frame.return_ip as i64 - 1;
                    self.push_operand(result)?;
                    if self.verbose {
                        writeln!(self.out, "Frame popped from the control stack.").ok();
                    }
                    // the frame drops here, releasing its locals and any
                    // operands left behind
                }

                Opcode::StoreGlobal => {
                    let value = self.pop_operand()?;
                    if self.global_operands.len() >= self.config.max_operand_stack {
                        return Err(stack_overflow(self.config.max_operand_stack));
                    }
                    self.global_operands.push(value);
                }

                Opcode::LoadGlobal => {
                    let value = self.global_operands.pop().ok_or_else(stack_underflow)?;
                    self.push_operand(value)?;
                }

                Opcode::Printk => {
                    let value = self.pop_operand()?;
                    let line = value.borrow().to_string();
                    writeln!(self.out, "{}", line)
                        .map_err(|e| VmError::new(format!("PRINTK write failed: {}", e)))?;
                }

                Opcode::Halt => {
                    if self.verbose {
                        writeln!(self.out, "Program received HALT signal, terminating...").ok();
                    }
                    break;
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Operand stack access
    // =========================================================================

    fn operands_mut(&mut self) -> &mut Vec<SlotRef> {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.operands,
            None => &mut self.global_operands,
        }
    }

    fn pop_operand(&mut self) -> Result<SlotRef, VmError> {
        self.operands_mut().pop().ok_or_else(stack_underflow)
    }

    /// Acquire the top of the active stack without popping it.
    fn peek_operand(&mut self) -> Result<SlotRef, VmError> {
        self.operands_mut()
            .last()
            .cloned()
            .ok_or_else(stack_underflow)
    }

    fn push_operand(&mut self, slot: SlotRef) -> Result<(), VmError> {
        let limit = self.config.max_operand_stack;
        let operands = self.operands_mut();
        if operands.len() >= limit {
            return Err(stack_overflow(limit));
        }
        operands.push(slot);
        Ok(())
    }

    fn jump_to(&mut self, addr: i64) -> Result<(), VmError> {
        let index = self
            .image
            .index_of(addr)
            .ok_or_else(|| unmapped_address(addr))?;
        self.ip = index as i64 - 1;
        Ok(())
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn exec_unary(&mut self, code: i64) -> Result<(), VmError> {
        let operand = self.pop_operand()?;
        match code {
            // logical NOT
            0 => {
                let result = match &*operand.borrow() {
                    Slot::Int(n) => Slot::int(if *n == 0 { 1 } else { 0 }),
                    _ => self.undefined(),
                };
                self.push_operand(result)?;
            }
            // arithmetic negate
            1 => {
                let result = match &*operand.borrow() {
                    Slot::Int(n) => Slot::int(n.wrapping_neg()),
                    Slot::Float(x) => Slot::float(-x),
                    _ => self.undefined(),
                };
                self.push_operand(result)?;
            }
            // post-increment / post-decrement mutate the popped slot in
            // place, so the update is visible through every alias of the
            // variable it was loaded from; nothing is pushed back
            2 | 3 => {
                let delta = if code == 2 { 1 } else { -1 };
                if let Slot::Int(n) = &mut *operand.borrow_mut() {
                    *n = n.wrapping_add(delta);
                }
            }
            _ => return Err(unknown_operator("UNARY_OP", code)),
        }
        Ok(())
        // the popped handle drops here
    }

    fn eval_binary(&self, code: i64, left: &Slot, right: &Slot) -> Result<SlotRef, VmError> {
        let result = match code {
            // arithmetic, Int widening to Float on mixed operands
            0 => self.arith(left, right, i64::wrapping_add, |a, b| a + b),
            1 => self.arith(left, right, i64::wrapping_sub, |a, b| a - b),
            2 => self.arith(left, right, i64::wrapping_mul, |a, b| a * b),

            // % is Int/Int only
            3 => match (left, right) {
                (Slot::Int(_), Slot::Int(0)) => return Err(modulo_by_zero()),
                (Slot::Int(a), Slot::Int(b)) => Slot::int(a.wrapping_rem(*b)),
                _ => self.undefined(),
            },

            4 => match (left, right) {
                (Slot::Int(_), Slot::Int(0)) => return Err(division_by_zero()),
                (Slot::Int(a), Slot::Int(b)) => Slot::int(a.wrapping_div(*b)),
                (Slot::Int(a), Slot::Float(b)) => Slot::float(*a as f64 / b),
                (Slot::Float(a), Slot::Int(b)) => Slot::float(a / *b as f64),
                (Slot::Float(a), Slot::Float(b)) => Slot::float(a / b),
                _ => self.undefined(),
            },

            // bitwise, Int/Int only
            5 => self.bitwise(left, right, |a, b| a & b),
            6 => self.bitwise(left, right, |a, b| a | b),
            7 => self.bitwise(left, right, |a, b| a.wrapping_shl(b as u32)),
            8 => self.bitwise(left, right, |a, b| a.wrapping_shr(b as u32)),
            9 => self.bitwise(left, right, |a, b| a ^ b),

            // ordered comparisons; Int/Int compares exactly, mixed as floats
            10 => self.compare(left, right, i64::lt, f64::lt),
            11 => self.compare(left, right, i64::le, f64::le),
            12 => self.compare(left, right, i64::gt, f64::gt),
            13 => self.compare(left, right, i64::ge, f64::ge),

            // equality is defined across every kind pair: mismatched kinds
            // are simply never equal
            14 => Slot::int(slots_equal(left, right) as i64),
            15 => Slot::int(!slots_equal(left, right) as i64),

            _ => return Err(unknown_operator("BINARY_OP", code)),
        };
        Ok(result)
    }

    fn arith(
        &self,
        left: &Slot,
        right: &Slot,
        int_op: fn(i64, i64) -> i64,
        float_op: fn(f64, f64) -> f64,
    ) -> SlotRef {
        match (left, right) {
            (Slot::Int(a), Slot::Int(b)) => Slot::int(int_op(*a, *b)),
            (Slot::Int(a), Slot::Float(b)) => Slot::float(float_op(*a as f64, *b)),
            (Slot::Float(a), Slot::Int(b)) => Slot::float(float_op(*a, *b as f64)),
            (Slot::Float(a), Slot::Float(b)) => Slot::float(float_op(*a, *b)),
            _ => self.undefined(),
        }
    }

    fn bitwise(&self, left: &Slot, right: &Slot, op: fn(i64, i64) -> i64) -> SlotRef {
        match (left, right) {
            (Slot::Int(a), Slot::Int(b)) => Slot::int(op(*a, *b)),
            _ => self.undefined(),
        }
    }

    fn compare(
        &self,
        left: &Slot,
        right: &Slot,
        int_op: fn(&i64, &i64) -> bool,
        float_op: fn(&f64, &f64) -> bool,
    ) -> SlotRef {
        let truth = match (left, right) {
            (Slot::Int(a), Slot::Int(b)) => int_op(a, b),
            (Slot::Int(a), Slot::Float(b)) => float_op(&(*a as f64), b),
            (Slot::Float(a), Slot::Int(b)) => float_op(a, &(*b as f64)),
            (Slot::Float(a), Slot::Float(b)) => float_op(a, b),
            _ => return self.undefined(),
        };
        Slot::int(truth as i64)
    }

    /// Operand kinds that fall off an operator table leave the result
    /// undefined. Handing out the null value keeps execution deterministic
    /// without defining an in-band error.
    fn undefined(&self) -> SlotRef {
        Rc::clone(&self.null)
    }
}

fn slots_equal(left: &Slot, right: &Slot) -> bool {
    match (left, right) {
        (Slot::Int(a), Slot::Int(b)) => a == b,
        (Slot::Float(a), Slot::Float(b)) => a == b,
        (Slot::Char(a), Slot::Char(b)) => a == b,
        _ => false,
    }
}

fn load_cell(cells: &[Option<SlotRef>], scope: &'static str, index: i64) -> Result<SlotRef, VmError> {
    let cell = usize::try_from(index)
        .ok()
        .and_then(|i| cells.get(i))
        .ok_or_else(|| variable_out_of_range(scope, index, cells.len()))?;
    cell.clone().ok_or_else(|| unbound_variable(scope, index))
}

fn store_cell(
    cells: &mut [Option<SlotRef>],
    scope: &'static str,
    index: i64,
    value: SlotRef,
) -> Result<(), VmError> {
    let len = cells.len();
    let cell = usize::try_from(index)
        .ok()
        .and_then(|i| cells.get_mut(i))
        .ok_or_else(|| variable_out_of_range(scope, index, len))?;
    // the previous binding drops here: one release
    *cell = Some(value);
    Ok(())
}

fn require_int(slot: &SlotRef, what: &'static str) -> Result<i64, VmError> {
    match &*slot.borrow() {
        Slot::Int(n) => Ok(*n),
        other => Err(kind_mismatch(what, Kind::Int, other.kind())),
    }
}

fn wait_for_enter() {
    let mut line = String::new();
    io::stdin().read_line(&mut line).ok();
}
