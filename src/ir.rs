//! Type definitions for the block-local IR.
//!
//! A [`Function`] owns an arena of [`Instruction`]s plus an ordered list of
//! basic blocks, each of which is an ordered sequence of instruction ids.
//! Every instruction carries its own use list, the set of back-edges from
//! the instructions that read its result, so both directions of the def-use
//! graph are available in constant time: operands forward, uses backward.

pub use id_arena::{Arena, Id};

/// An identifier for an instruction in a function's arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstId(pub(crate) Id<Instruction>);

impl From<InstId> for Id<Instruction> {
    #[inline]
    fn from(id: InstId) -> Self {
        id.0
    }
}

/// An identifier for a basic block within its function.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);

/// A constant value: an immutable signed integer of fixed bit width.
///
/// Equality is exact: both the value and the width must match.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Constant {
    /// The constant value.
    pub value: i128,

    /// The bit width of the value's integer type.
    pub width: u16,
}

impl Constant {
    /// Construct a constant of the given bit width.
    pub fn new(value: i128, width: u16) -> Self {
        Constant { value, width }
    }
}

/// The operation performed by a binary instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Wrapping integer addition.
    Add,

    /// Wrapping integer subtraction.
    Sub,

    /// Wrapping integer multiplication.
    Mul,

    /// Signed integer division.
    Sdiv,

    /// Bit shift left.
    Shl,

    /// Arithmetic bit shift right (sign extending).
    Ashr,
}

impl Opcode {
    /// Does `a op b` compute the same value as `b op a`?
    pub fn is_commutative(self) -> bool {
        match self {
            Opcode::Add | Opcode::Mul => true,
            Opcode::Sub | Opcode::Sdiv | Opcode::Shl | Opcode::Ashr => false,
        }
    }

    #[cfg(feature = "stringify")]
    pub(crate) fn name(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Sdiv => "sdiv",
            Opcode::Shl => "shl",
            Opcode::Ashr => "ashr",
        }
    }
}

/// An operand of an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// The result of another instruction defined earlier, or an input
    /// variable.
    Value(InstId),

    /// A literal constant value.
    Constant(Constant),
}

impl From<InstId> for Operand {
    fn from(v: InstId) -> Self {
        Operand::Value(v)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Constant(c)
    }
}

impl Operand {
    /// The constant held by this operand, if it is one.
    pub fn as_constant(self) -> Option<Constant> {
        match self {
            Operand::Constant(c) => Some(c),
            Operand::Value(_) => None,
        }
    }

    /// The instruction referenced by this operand, if it is one.
    pub fn as_value(self) -> Option<InstId> {
        match self {
            Operand::Value(v) => Some(v),
            Operand::Constant(_) => None,
        }
    }
}

/// Which of a binary instruction's two operand slots a use occupies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// The left-hand operand.
    Lhs,

    /// The right-hand operand.
    Rhs,
}

/// A use edge: a back-reference recording that the `slot` operand of `user`
/// reads the producing instruction's result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Use {
    /// The consuming instruction.
    pub user: InstId,

    /// The operand slot of `user` that reads the produced value.
    pub slot: Slot,
}

/// What an instruction computes.
#[derive(Copy, Clone, Debug)]
pub enum InstData {
    /// An opaque input variable: a function parameter or any other value
    /// defined outside the region being rewritten.
    Var,

    /// A two-operand integer operation.
    Binary {
        /// The operation performed.
        op: Opcode,

        /// The left-hand operand.
        lhs: Operand,

        /// The right-hand operand.
        rhs: Operand,
    },
}

/// An instruction together with the use edges pointing back at it.
#[derive(Clone, Debug)]
pub struct Instruction {
    data: InstData,
    uses: Vec<Use>,
}

impl Instruction {
    /// What this instruction computes.
    pub fn data(&self) -> &InstData {
        &self.data
    }

    /// The use edges reading this instruction's result, in the order the
    /// consumers were attached.
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }
}

#[derive(Clone, Debug, Default)]
struct Block {
    sequence: Vec<InstId>,
}

/// A function: an instruction arena plus its basic blocks.
///
/// Instructions live in the arena and are addressed by [`InstId`]; a block
/// is an ordered sequence of those ids in def-before-use order. Input
/// variables ([`InstData::Var`]) live in the arena but in no block.
#[derive(Clone, Debug, Default)]
pub struct Function {
    insts: Arena<Instruction>,
    blocks: Vec<Block>,
}

impl Function {
    /// Construct an empty function.
    pub fn new() -> Self {
        Function::default()
    }

    /// Define a new input variable.
    pub fn var(&mut self) -> InstId {
        InstId(self.insts.alloc(Instruction {
            data: InstData::Var,
            uses: vec![],
        }))
    }

    /// Append a new, initially empty basic block.
    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        BlockId(self.blocks.len() - 1)
    }

    /// The ids of this function's blocks, in order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// The instruction sequence of `block`, in execution order.
    pub fn block(&self, block: BlockId) -> &[InstId] {
        &self.blocks[block.0].sequence
    }

    /// The ids of this function's input variables.
    pub fn vars(&self) -> impl Iterator<Item = InstId> + '_ {
        self.insts.iter().filter_map(|(id, inst)| match inst.data {
            InstData::Var => Some(InstId(id)),
            InstData::Binary { .. } => None,
        })
    }

    /// Append a binary instruction to the end of `block`.
    pub fn append_binary(
        &mut self,
        block: BlockId,
        op: Opcode,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> InstId {
        let id = self.new_binary(op, lhs.into(), rhs.into());
        self.blocks[block.0].sequence.push(id);
        id
    }

    /// Insert a binary instruction into `block` immediately after `anchor`.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is not in `block`.
    pub fn insert_binary_after(
        &mut self,
        block: BlockId,
        anchor: InstId,
        op: Opcode,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> InstId {
        let pos = self.blocks[block.0]
            .sequence
            .iter()
            .position(|&i| i == anchor)
            .expect("insertion anchor is not in this block");
        let id = self.new_binary(op, lhs.into(), rhs.into());
        self.blocks[block.0].sequence.insert(pos + 1, id);
        id
    }

    fn new_binary(&mut self, op: Opcode, lhs: Operand, rhs: Operand) -> InstId {
        let id = InstId(self.insts.alloc(Instruction {
            data: InstData::Binary { op, lhs, rhs },
            uses: vec![],
        }));
        self.record_use(lhs, id, Slot::Lhs);
        self.record_use(rhs, id, Slot::Rhs);
        id
    }

    fn record_use(&mut self, operand: Operand, user: InstId, slot: Slot) {
        if let Operand::Value(v) = operand {
            self.insts[v.0].uses.push(Use { user, slot });
        }
    }

    fn forget_use(&mut self, operand: Operand, user: InstId, slot: Slot) {
        if let Operand::Value(v) = operand {
            let uses = &mut self.insts[v.0].uses;
            let pos = uses
                .iter()
                .position(|u| u.user == user && u.slot == slot)
                .expect("operand's producer does not know about this use");
            uses.swap_remove(pos);
        }
    }

    /// What `id` computes.
    pub fn data(&self, id: InstId) -> &InstData {
        self.insts[id.0].data()
    }

    /// The opcode and operands of `id`, if it is a binary instruction.
    pub fn binary_operands(&self, id: InstId) -> Option<(Opcode, Operand, Operand)> {
        match *self.insts[id.0].data() {
            InstData::Binary { op, lhs, rhs } => Some((op, lhs, rhs)),
            InstData::Var => None,
        }
    }

    /// The use edges reading `id`'s result.
    pub fn uses(&self, id: InstId) -> &[Use] {
        self.insts[id.0].uses()
    }

    /// The block whose sequence contains `id`, or `None` for instructions
    /// that live in no block (input variables).
    pub fn containing_block(&self, id: InstId) -> Option<BlockId> {
        (0..self.blocks.len())
            .find(|&b| self.blocks[b].sequence.contains(&id))
            .map(BlockId)
    }

    /// Redirect every use of `of` to read `with` instead.
    ///
    /// After this call `of` has no remaining uses. When `with` is a value,
    /// the redirected edges are appended to its use list.
    pub fn replace_all_uses(&mut self, of: InstId, with: impl Into<Operand>) {
        let with = with.into();
        debug_assert_ne!(Some(of), with.as_value());
        let uses = std::mem::take(&mut self.insts[of.0].uses);
        for u in &uses {
            match &mut self.insts[u.user.0].data {
                InstData::Binary { lhs, rhs, .. } => {
                    let operand = match u.slot {
                        Slot::Lhs => lhs,
                        Slot::Rhs => rhs,
                    };
                    debug_assert_eq!(*operand, Operand::Value(of));
                    *operand = with;
                }
                InstData::Var => unreachable!("a var has no operand slots"),
            }
        }
        if let Operand::Value(v) = with {
            self.insts[v.0].uses.extend(uses);
        }
    }

    /// Erase `id` from `block`, unregistering its operands' use edges.
    ///
    /// # Panics
    ///
    /// Panics if `id`'s result is still used (callers must redirect every
    /// use before erasing), or if `id` is not in `block`.
    pub fn remove(&mut self, block: BlockId, id: InstId) {
        assert!(
            self.insts[id.0].uses.is_empty(),
            "erasing an instruction whose result is still used"
        );
        if let InstData::Binary { lhs, rhs, .. } = *self.insts[id.0].data() {
            self.forget_use(lhs, id, Slot::Lhs);
            self.forget_use(rhs, id, Slot::Rhs);
        }
        let sequence = &mut self.blocks[block.0].sequence;
        let pos = sequence
            .iter()
            .position(|&i| i == id)
            .expect("instruction is not in this block");
        sequence.remove(pos);
    }
}

/// A module: an ordered collection of functions.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// The functions of the module, in definition order.
    pub functions: Vec<Function>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32c(value: i128) -> Constant {
        Constant::new(value, 32)
    }

    #[test]
    fn uses_are_recorded_on_creation() {
        let mut func = Function::new();
        let x = func.var();
        let block = func.add_block();
        let a = func.append_binary(block, Opcode::Add, x, i32c(1));
        let b = func.append_binary(block, Opcode::Mul, a, x);

        assert_eq!(func.uses(x), [Use { user: a, slot: Slot::Lhs }, Use { user: b, slot: Slot::Rhs }]);
        assert_eq!(func.uses(a), [Use { user: b, slot: Slot::Lhs }]);
        assert!(func.uses(b).is_empty());
    }

    #[test]
    fn replace_all_uses_moves_edges_to_the_replacement() {
        let mut func = Function::new();
        let x = func.var();
        let block = func.add_block();
        let a = func.append_binary(block, Opcode::Add, x, i32c(0));
        let b = func.append_binary(block, Opcode::Mul, a, i32c(3));
        let c = func.append_binary(block, Opcode::Sub, a, x);

        func.replace_all_uses(a, x);

        assert!(func.uses(a).is_empty());
        assert_eq!(func.binary_operands(b).unwrap().1, Operand::Value(x));
        assert_eq!(func.binary_operands(c).unwrap().1, Operand::Value(x));
        // `x` is now read by `a` (its surviving operand), `b`, and `c` twice.
        assert_eq!(func.uses(x).len(), 4);
    }

    #[test]
    fn insert_after_splices_into_the_sequence() {
        let mut func = Function::new();
        let x = func.var();
        let block = func.add_block();
        let a = func.append_binary(block, Opcode::Add, x, i32c(1));
        let b = func.append_binary(block, Opcode::Add, a, i32c(2));
        let mid = func.insert_binary_after(block, a, Opcode::Mul, a, x);

        assert_eq!(func.block(block), [a, mid, b]);
    }

    #[test]
    fn containing_block_finds_the_owner() {
        let mut func = Function::new();
        let x = func.var();
        let first = func.add_block();
        let second = func.add_block();
        let a = func.append_binary(first, Opcode::Add, x, i32c(1));
        let b = func.append_binary(second, Opcode::Mul, a, x);

        assert_eq!(func.containing_block(a), Some(first));
        assert_eq!(func.containing_block(b), Some(second));
        assert_eq!(func.containing_block(x), None);
    }

    #[test]
    fn remove_unregisters_operand_uses() {
        let mut func = Function::new();
        let x = func.var();
        let block = func.add_block();
        let a = func.append_binary(block, Opcode::Add, x, i32c(1));

        func.remove(block, a);

        assert!(func.block(block).is_empty());
        assert!(func.uses(x).is_empty());
    }

    #[test]
    #[should_panic(expected = "still used")]
    fn remove_panics_on_a_live_instruction() {
        let mut func = Function::new();
        let x = func.var();
        let block = func.add_block();
        let a = func.append_binary(block, Opcode::Add, x, i32c(1));
        func.append_binary(block, Opcode::Mul, a, x);

        func.remove(block, a);
    }
}
