//! The local optimization pass.
//!
//! One forward scan per basic block, trying three rewrites on every
//! instruction:
//!
//! 1. algebraic-identity elimination (`x + 0`, `x - 0`, `x * 1`, `x / 1`);
//! 2. strength reduction of multiplication and signed division by
//!    near-power-of-two constants into shifts;
//! 3. cancellation of a consumer that undoes the instruction with the same
//!    constant (`(x + 5) - 5` collapses to `x`).
//!
//! Rules only redirect use edges and mark instructions dead; the dead are
//! erased once, after the scan, so the scan always walks the original
//! sequence and never observes a dangling operand.

use crate::ir::{BlockId, Constant, Function, InstId, Module, Opcode, Operand};

/// The outcome of offering one rewrite rule one instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuleResult {
    /// The rule fired and rewrote the graph.
    Matched,

    /// The rule's pattern did not apply; nothing was modified.
    NotApplicable,
}

impl RuleResult {
    /// Did the rule fire?
    pub fn is_matched(self) -> bool {
        self == RuleResult::Matched
    }
}

/// A mixed binary instruction: exactly one constant operand, one variable
/// operand.
#[derive(Copy, Clone, Debug)]
struct Mixed {
    op: Opcode,
    constant: Constant,
    value: InstId,
    constant_on_lhs: bool,
}

impl Mixed {
    /// Is the constant on a side where a non-commutative opcode still reads
    /// it as the second argument? `x - 0` is an identity; `0 - x` is not.
    fn constant_is_second_arg(&self) -> bool {
        self.op.is_commutative() || !self.constant_on_lhs
    }
}

/// Classify `id`, returning `Some` iff it is a binary instruction with
/// exactly one constant operand. Two constants (a job for constant folding)
/// or two variables reject, as does any non-binary instruction.
fn mixed_operands(func: &Function, id: InstId) -> Option<Mixed> {
    let (op, lhs, rhs) = func.binary_operands(id)?;
    match (lhs, rhs) {
        (Operand::Constant(constant), Operand::Value(value)) => Some(Mixed {
            op,
            constant,
            value,
            constant_on_lhs: true,
        }),
        (Operand::Value(value), Operand::Constant(constant)) => Some(Mixed {
            op,
            constant,
            value,
            constant_on_lhs: false,
        }),
        _ => None,
    }
}

/// Eliminate a binary instruction whose constant operand is the identity
/// element for its opcode: `x + 0`, `x - 0`, `x * 1`, `x / 1`.
///
/// On a match, every use of the instruction is redirected to the variable
/// operand and the instruction becomes dead; erasing it is the caller's
/// job. For the non-commutative `Sub` and `Sdiv` the constant must be the
/// right-hand operand: `0 - x` is a negation, not an identity.
pub fn algebraic_identity(func: &mut Function, id: InstId) -> RuleResult {
    let mixed = match mixed_operands(func, id) {
        Some(m) => m,
        None => return RuleResult::NotApplicable,
    };
    if !mixed.constant_is_second_arg() {
        return RuleResult::NotApplicable;
    }
    let identity = match mixed.op {
        Opcode::Add | Opcode::Sub => 0,
        Opcode::Mul | Opcode::Sdiv => 1,
        Opcode::Shl | Opcode::Ashr => return RuleResult::NotApplicable,
    };
    if mixed.constant.value != identity {
        return RuleResult::NotApplicable;
    }
    func.replace_all_uses(id, mixed.value);
    RuleResult::Matched
}

/// The exponent of the power of two nearest to `c`, with the signed
/// remainder `c - 2^k`. Ties round up, so `3` is `2^2 - 1`. `None` when
/// `c < 1`; no such `c` is within one of a power of two reachable here.
fn nearest_power_of_two(c: i128) -> Option<(u32, i128)> {
    if c < 1 {
        return None;
    }
    let mag = c as u128;
    let floor = 127 - mag.leading_zeros();
    let below = 1u128 << floor;
    let above = below << 1;
    if mag - below < above - mag {
        Some((floor, (mag - below) as i128))
    } else {
        Some((floor + 1, -((above - mag) as i128)))
    }
}

/// Rewrite multiplication or signed division by a near-power-of-two
/// constant into a shift.
///
/// * `mul x, 2^k` becomes `shl x, k`;
/// * `mul x, 2^k + 1` becomes `(shl x, k) + x`;
/// * `mul x, 2^k - 1` becomes `(shl x, k) - x`;
/// * `sdiv x, 2^k` becomes `ashr x, k`.
///
/// Division by anything that is not an exact power of two is left alone: a
/// shift plus correction would round differently than `sdiv` does. The new
/// instructions are inserted immediately after the original (its variable
/// operand is defined earlier, so def-before-use order is preserved) and
/// every use of the original is redirected to the last of them. Erasing the
/// original is the caller's job.
pub fn strength_reduction(func: &mut Function, block: BlockId, id: InstId) -> RuleResult {
    let mixed = match mixed_operands(func, id) {
        Some(m) => m,
        None => return RuleResult::NotApplicable,
    };
    let is_mul = match mixed.op {
        Opcode::Mul => true,
        Opcode::Sdiv => false,
        _ => return RuleResult::NotApplicable,
    };
    // For division the constant must be the divisor; `c / x` has no shift
    // form.
    if !mixed.constant_is_second_arg() {
        return RuleResult::NotApplicable;
    }
    let (k, remainder) = match nearest_power_of_two(mixed.constant.value) {
        Some(kr) => kr,
        None => return RuleResult::NotApplicable,
    };
    if remainder.unsigned_abs() > 1 || (!is_mul && remainder != 0) {
        return RuleResult::NotApplicable;
    }

    let amount = Constant::new(i128::from(k), mixed.constant.width);
    let shift = func.insert_binary_after(
        block,
        id,
        if is_mul { Opcode::Shl } else { Opcode::Ashr },
        mixed.value,
        amount,
    );
    if is_mul && remainder != 0 {
        let correction = func.insert_binary_after(
            block,
            shift,
            if remainder > 0 { Opcode::Add } else { Opcode::Sub },
            shift,
            mixed.value,
        );
        func.replace_all_uses(id, correction);
    } else {
        func.replace_all_uses(id, shift);
    }
    RuleResult::Matched
}

/// The opcode whose effect undoes `op` when applied with the same constant.
fn inverse(op: Opcode) -> Option<Opcode> {
    match op {
        Opcode::Add => Some(Opcode::Sub),
        Opcode::Sub => Some(Opcode::Add),
        Opcode::Mul => Some(Opcode::Sdiv),
        Opcode::Sdiv => Some(Opcode::Mul),
        Opcode::Shl | Opcode::Ashr => None,
    }
}

/// Cancel every consumer of `id` that performs the inverse operation with
/// the identical constant: in `t = x + 5; u = t - 5`, every use of `u` is
/// redirected to `x` and `u` is marked dead by appending it to `dead`.
///
/// The use list is block-agnostic, so a cancelled consumer may live in a
/// different block than `id`; each dead id is recorded together with its
/// owning block and the caller erases it from there.
///
/// `id` itself stays live, since it may have other consumers; it is erased
/// separately if another rule also matched it. Only immediate consumers are
/// inspected; a longer chain of cancelling operations resolves over repeated
/// runs of the whole pass.
pub fn cancel_inverse_consumers(
    func: &mut Function,
    id: InstId,
    dead: &mut Vec<(BlockId, InstId)>,
) -> RuleResult {
    let mixed = match mixed_operands(func, id) {
        Some(m) => m,
        None => return RuleResult::NotApplicable,
    };
    // `5 - x` composed with `t + 5` yields `10 - x`, not `x`.
    if !mixed.constant_is_second_arg() {
        return RuleResult::NotApplicable;
    }
    let inverse_op = match inverse(mixed.op) {
        Some(op) => op,
        None => return RuleResult::NotApplicable,
    };

    let consumers: Vec<InstId> = func.uses(id).iter().map(|u| u.user).collect();
    let mut result = RuleResult::NotApplicable;
    for consumer_id in consumers {
        if dead.iter().any(|&(_, d)| d == consumer_id) {
            continue;
        }
        let consumer = match mixed_operands(func, consumer_id) {
            Some(m) => m,
            None => continue,
        };
        if consumer.op != inverse_op
            || consumer.constant != mixed.constant
            || !consumer.constant_is_second_arg()
        {
            continue;
        }
        let owner = func
            .containing_block(consumer_id)
            .expect("consumer is not in any block");
        func.replace_all_uses(consumer_id, mixed.value);
        dead.push((owner, consumer_id));
        result = RuleResult::Matched;
    }
    result
}

/// Run all local rewrites over one basic block. Returns whether the block
/// was modified.
///
/// A single forward scan over a snapshot of the block's sequence: each
/// instruction is offered to the identity rule, then (if that did not fire)
/// to strength reduction, and its consumers are offered to cancellation.
/// Instructions made dead accumulate in a deferred list and
/// are erased only after the whole scan, so use-edge redirection always
/// completes before anything is erased. Each dead id carries its owning
/// block: a cancelled consumer may live in another block and is erased from
/// there.
pub fn run_on_block(func: &mut Function, block: BlockId) -> bool {
    let sequence: Vec<InstId> = func.block(block).to_vec();
    let mut dead: Vec<(BlockId, InstId)> = Vec::new();
    for id in sequence {
        // A consumer cancelled earlier in the scan has already been
        // rewritten; offering it to the rules again would insert dead
        // instructions and mark it twice.
        if dead.iter().any(|&(_, d)| d == id) {
            continue;
        }
        let rewritten = algebraic_identity(func, id).is_matched()
            || strength_reduction(func, block, id).is_matched();
        if rewritten {
            dead.push((block, id));
        }
        cancel_inverse_consumers(func, id, &mut dead);
    }
    let changed = !dead.is_empty();
    for (owner, id) in dead {
        func.remove(owner, id);
    }
    changed
}

/// Run the pass over every block of a function. Returns whether any block
/// was modified.
pub fn run_on_function(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.blocks().collect::<Vec<_>>() {
        changed |= run_on_block(func, block);
    }
    changed
}

/// Run the pass over every function of a module.
///
/// Returns whether any rewrite occurred anywhere, which a caller that
/// caches derived analyses uses to decide whether they must be invalidated.
/// The pass never iterates to a fixed point internally; rerun it until it
/// reports no change to resolve chains that need repeated application.
pub fn run(module: &mut Module) -> bool {
    let mut changed = false;
    for func in &mut module.functions {
        changed |= run_on_function(func);
    }
    changed
}
