//! Emitting a human-readable text format for the IR.
//!
//! One instruction per line, numbered in definition order:
//!
//! ```text
//! %0 = var
//! block0:
//!   %1 = mul %0, 5:i32
//!   %2 = add %1, 100:i32
//! ```

use crate::ir::{Constant, Function, InstData, InstId, Module, Operand};
use std::collections::HashMap;
use std::fmt::{self, Display};

impl Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:i{}", self.value, self.width)
    }
}

/// Like `std::fmt::Display`, but with the numbering assigned to earlier
/// instructions as context.
trait DisplayWithContext {
    fn display(&self, names: &HashMap<InstId, usize>, f: &mut fmt::Formatter) -> fmt::Result;
}

impl DisplayWithContext for Operand {
    fn display(&self, names: &HashMap<InstId, usize>, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "%{}", names[v]),
            Operand::Constant(c) => write!(f, "{}", c),
        }
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names = HashMap::new();
        for var in self.vars() {
            let n = names.len();
            names.insert(var, n);
            writeln!(f, "%{} = var", n)?;
        }
        for block in self.blocks() {
            writeln!(f, "block{}:", block.0)?;
            for &id in self.block(block) {
                let n = names.len();
                names.insert(id, n);
                match *self.data(id) {
                    InstData::Var => unreachable!("vars do not live in blocks"),
                    InstData::Binary { op, lhs, rhs } => {
                        write!(f, "  %{} = {} ", n, op.name())?;
                        lhs.display(&names, f)?;
                        write!(f, ", ")?;
                        rhs.display(&names, f)?;
                        writeln!(f)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (n, func) in self.functions.iter().enumerate() {
            writeln!(f, "func{}:", n)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Constant, Function, Opcode};

    #[test]
    fn functions_render_one_instruction_per_line() {
        let mut func = Function::new();
        let x = func.var();
        let block = func.add_block();
        let a = func.append_binary(block, Opcode::Mul, x, Constant::new(5, 32));
        func.append_binary(block, Opcode::Add, a, Constant::new(100, 32));

        assert_eq!(
            func.to_string(),
            "\
%0 = var
block0:
  %1 = mul %0, 5:i32
  %2 = add %1, 100:i32
"
        );
    }
}
