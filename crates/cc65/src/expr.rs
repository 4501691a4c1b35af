use std::fmt;

use super::*;

const NODE_TYPE_MASK: u8 = 0xC0;
const BINARY_NODE: u8 = 0x00;
const UNARY_NODE: u8 = 0x40;
const LEAF_NODE: u8 = 0x80;

const EXPR_NULL: u8 = 0x00;
const EXPR_LITERAL: u8 = LEAF_NODE | 0x01;
const EXPR_SYMBOL: u8 = LEAF_NODE | 0x02;
const EXPR_SECTION: u8 = LEAF_NODE | 0x03;
const EXPR_SEGMENT: u8 = LEAF_NODE | 0x04;
const EXPR_MEMAREA: u8 = LEAF_NODE | 0x05;
const EXPR_ULABEL: u8 = LEAF_NODE | 0x06;

/// Fixup expression tree as stored in object files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// The zero tag byte; stands in for an absent operand.
    Empty,
    Literal(i32),
    /// Reference to an entry of the object's import table.
    Symbol(u32),
    /// Reference to a segment of the same object, by position.
    Section(u32),
    Segment(u32),
    MemoryArea(u32),
    ULabel(u32),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Swap,
    BoolNot,
    Bank,
    Byte0,
    Byte1,
    Byte2,
    Byte3,
    Word0,
    Word1,
    FarAddr,
    DWord,
    NearAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Or,
    Xor,
    And,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    BoolAnd,
    BoolOr,
    BoolXor,
    Max,
    Min,
}

impl UnaryOp {
    pub fn from_code(code: u8) -> Option<Self> {
        let op = match code {
            0x41 => Self::Neg,
            0x42 => Self::Not,
            0x43 => Self::Swap,
            0x44 => Self::BoolNot,
            0x45 => Self::Bank,
            0x48 => Self::Byte0,
            0x49 => Self::Byte1,
            0x4A => Self::Byte2,
            0x4B => Self::Byte3,
            0x4C => Self::Word0,
            0x4D => Self::Word1,
            0x4E => Self::FarAddr,
            0x4F => Self::DWord,
            0x50 => Self::NearAddr,
            _ => return None,
        };
        Some(op)
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Neg => 0x41,
            Self::Not => 0x42,
            Self::Swap => 0x43,
            Self::BoolNot => 0x44,
            Self::Bank => 0x45,
            Self::Byte0 => 0x48,
            Self::Byte1 => 0x49,
            Self::Byte2 => 0x4A,
            Self::Byte3 => 0x4B,
            Self::Word0 => 0x4C,
            Self::Word1 => 0x4D,
            Self::FarAddr => 0x4E,
            Self::DWord => 0x4F,
            Self::NearAddr => 0x50,
        }
    }

    fn apply(self, value: i64) -> i64 {
        match self {
            Self::Neg => value.wrapping_neg(),
            Self::Not => !value,
            Self::Swap => ((value >> 8) & 0xFF) | ((value & 0xFF) << 8),
            Self::BoolNot => i64::from(value == 0),
            Self::Bank | Self::Byte2 => (value >> 16) & 0xFF,
            Self::Byte0 => value & 0xFF,
            Self::Byte1 => (value >> 8) & 0xFF,
            Self::Byte3 => (value >> 24) & 0xFF,
            Self::Word0 | Self::NearAddr => value & 0xFFFF,
            Self::Word1 => (value >> 16) & 0xFFFF,
            Self::FarAddr => value & 0xFF_FFFF,
            Self::DWord => value & 0xFFFF_FFFF,
        }
    }

    fn spelling(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "~",
            Self::Swap => ".swap",
            Self::BoolNot => ".not",
            Self::Bank => ".bank",
            Self::Byte0 => "<",
            Self::Byte1 => ">",
            Self::Byte2 => "^",
            Self::Byte3 => ".byte3",
            Self::Word0 => ".loword",
            Self::Word1 => ".hiword",
            Self::FarAddr => ".faraddr",
            Self::DWord => ".dword",
            Self::NearAddr => ".nearaddr",
        }
    }
}

impl BinaryOp {
    pub fn from_code(code: u8) -> Option<Self> {
        let op = match code {
            0x01 => Self::Add,
            0x02 => Self::Sub,
            0x03 => Self::Mul,
            0x04 => Self::Div,
            0x05 => Self::Mod,
            0x06 => Self::Or,
            0x07 => Self::Xor,
            0x08 => Self::And,
            0x09 => Self::Shl,
            0x0A => Self::Shr,
            0x0B => Self::Eq,
            0x0C => Self::Ne,
            0x0D => Self::Lt,
            0x0E => Self::Gt,
            0x0F => Self::Le,
            0x10 => Self::Ge,
            0x11 => Self::BoolAnd,
            0x12 => Self::BoolOr,
            0x13 => Self::BoolXor,
            0x14 => Self::Max,
            0x15 => Self::Min,
            _ => return None,
        };
        Some(op)
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Add => 0x01,
            Self::Sub => 0x02,
            Self::Mul => 0x03,
            Self::Div => 0x04,
            Self::Mod => 0x05,
            Self::Or => 0x06,
            Self::Xor => 0x07,
            Self::And => 0x08,
            Self::Shl => 0x09,
            Self::Shr => 0x0A,
            Self::Eq => 0x0B,
            Self::Ne => 0x0C,
            Self::Lt => 0x0D,
            Self::Gt => 0x0E,
            Self::Le => 0x0F,
            Self::Ge => 0x10,
            Self::BoolAnd => 0x11,
            Self::BoolOr => 0x12,
            Self::BoolXor => 0x13,
            Self::Max => 0x14,
            Self::Min => 0x15,
        }
    }

    fn apply(self, lhs: i64, rhs: i64) -> Result<i64, ContainerError> {
        let value = match self {
            Self::Add => lhs.wrapping_add(rhs),
            Self::Sub => lhs.wrapping_sub(rhs),
            Self::Mul => lhs.wrapping_mul(rhs),
            Self::Div => {
                if rhs == 0 {
                    return Err(ContainerError::ExpressionDivisionByZero { op: "/" });
                }
                lhs.wrapping_div(rhs)
            }
            Self::Mod => {
                if rhs == 0 {
                    return Err(ContainerError::ExpressionDivisionByZero { op: ".mod" });
                }
                lhs.wrapping_rem(rhs)
            }
            Self::Or => lhs | rhs,
            Self::Xor => lhs ^ rhs,
            Self::And => lhs & rhs,
            Self::Shl => shift_left(lhs, rhs),
            Self::Shr => shift_left(lhs, rhs.wrapping_neg()),
            Self::Eq => i64::from(lhs == rhs),
            Self::Ne => i64::from(lhs != rhs),
            Self::Lt => i64::from(lhs < rhs),
            Self::Gt => i64::from(lhs > rhs),
            Self::Le => i64::from(lhs <= rhs),
            Self::Ge => i64::from(lhs >= rhs),
            Self::BoolAnd => i64::from(lhs != 0 && rhs != 0),
            Self::BoolOr => i64::from(lhs != 0 || rhs != 0),
            Self::BoolXor => i64::from((lhs != 0) != (rhs != 0)),
            Self::Max => lhs.max(rhs),
            Self::Min => lhs.min(rhs),
        };
        Ok(value)
    }

    fn spelling(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => ".mod",
            Self::Or => "|",
            Self::Xor => "^",
            Self::And => "&",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::BoolAnd => "&&",
            Self::BoolOr => "||",
            Self::BoolXor => ".xor",
            Self::Max => ".max",
            Self::Min => ".min",
        }
    }
}

// A negative count shifts the other way.
fn shift_left(value: i64, count: i64) -> i64 {
    if count >= 64 || count <= -64 {
        return if count > 0 || value >= 0 { 0 } else { -1 };
    }
    if count >= 0 {
        value.wrapping_shl(count as u32)
    } else {
        value >> (-count)
    }
}

/// Supplies link-time base addresses for the leaves an expression can
/// reference.
pub trait ExprResolver {
    fn section_base(&self, index: u32) -> Option<i64>;

    fn segment_base(&self, _index: u32) -> Option<i64> {
        None
    }

    fn memory_area_base(&self, _index: u32) -> Option<i64> {
        None
    }
}

impl Expr {
    pub(crate) fn decode(rd: &mut Reader<'_>) -> Result<Self, ContainerError> {
        let op = rd.read_u8()?;
        if op == EXPR_NULL {
            return Ok(Self::Empty);
        }

        match op & NODE_TYPE_MASK {
            LEAF_NODE => match op {
                EXPR_LITERAL => Ok(Self::Literal(rd.read_i32()?)),
                EXPR_SYMBOL => Ok(Self::Symbol(rd.read_var()?)),
                EXPR_SECTION => Ok(Self::Section(rd.read_var()?)),
                EXPR_SEGMENT => Ok(Self::Segment(rd.read_var()?)),
                EXPR_MEMAREA => Ok(Self::MemoryArea(rd.read_var()?)),
                EXPR_ULABEL => Ok(Self::ULabel(rd.read_var()?)),
                _ => Err(ContainerError::UnsupportedExpressionOp { op }),
            },
            UNARY_NODE => {
                let unary =
                    UnaryOp::from_code(op).ok_or(ContainerError::UnsupportedExpressionOp { op })?;
                let operand = Self::decode(rd)?;
                // Unary nodes still carry a right slot on disk.
                if Self::decode(rd)? != Self::Empty {
                    return Err(ContainerError::UnsupportedExpressionOp { op });
                }
                Ok(Self::Unary(unary, Box::new(operand)))
            }
            BINARY_NODE => {
                let binary =
                    BinaryOp::from_code(op).ok_or(ContainerError::UnsupportedExpressionOp { op })?;
                let lhs = Self::decode(rd)?;
                let rhs = Self::decode(rd)?;
                Ok(Self::Binary(binary, Box::new(lhs), Box::new(rhs)))
            }
            _ => Err(ContainerError::UnsupportedExpressionOp { op }),
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Empty => write_u8(out, EXPR_NULL),
            Self::Literal(value) => {
                write_u8(out, EXPR_LITERAL);
                out.extend_from_slice(&value.to_le_bytes());
            }
            Self::Symbol(index) => encode_leaf(out, EXPR_SYMBOL, *index),
            Self::Section(index) => encode_leaf(out, EXPR_SECTION, *index),
            Self::Segment(index) => encode_leaf(out, EXPR_SEGMENT, *index),
            Self::MemoryArea(index) => encode_leaf(out, EXPR_MEMAREA, *index),
            Self::ULabel(index) => encode_leaf(out, EXPR_ULABEL, *index),
            Self::Unary(op, operand) => {
                write_u8(out, op.code());
                operand.encode(out);
                write_u8(out, EXPR_NULL);
            }
            Self::Binary(op, lhs, rhs) => {
                write_u8(out, op.code());
                lhs.encode(out);
                rhs.encode(out);
            }
        }
    }

    /// Computes the value of the tree. Import references cannot be resolved
    /// from a single object and are refused.
    pub fn evaluate(&self, resolver: &impl ExprResolver) -> Result<i64, ContainerError> {
        match self {
            Self::Empty => Ok(0),
            Self::Literal(value) => Ok(i64::from(*value)),
            Self::Symbol(_) => Err(ContainerError::UnsupportedExpressionOp { op: EXPR_SYMBOL }),
            Self::ULabel(_) => Err(ContainerError::UnsupportedExpressionOp { op: EXPR_ULABEL }),
            Self::Section(index) => {
                resolver
                    .section_base(*index)
                    .ok_or(ContainerError::UnresolvedExpressionRef {
                        what: "section",
                        index: *index,
                    })
            }
            Self::Segment(index) => {
                resolver
                    .segment_base(*index)
                    .ok_or(ContainerError::UnresolvedExpressionRef {
                        what: "segment",
                        index: *index,
                    })
            }
            Self::MemoryArea(index) => {
                resolver
                    .memory_area_base(*index)
                    .ok_or(ContainerError::UnresolvedExpressionRef {
                        what: "memory area",
                        index: *index,
                    })
            }
            Self::Unary(op, operand) => Ok(op.apply(operand.evaluate(resolver)?)),
            Self::Binary(op, lhs, rhs) => {
                op.apply(lhs.evaluate(resolver)?, rhs.evaluate(resolver)?)
            }
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Self::Empty | Self::Literal(_) => true,
            Self::Unary(_, operand) => operand.is_constant(),
            Self::Binary(_, lhs, rhs) => lhs.is_constant() && rhs.is_constant(),
            _ => false,
        }
    }
}

fn encode_leaf(out: &mut Vec<u8>, tag: u8, index: u32) {
    write_u8(out, tag);
    write_var(out, index);
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("<empty>"),
            Self::Literal(value) if *value < 0 => write!(f, "-${:X}", value.unsigned_abs()),
            Self::Literal(value) => write!(f, "${value:X}"),
            Self::Symbol(index) => write!(f, "import#{index}"),
            Self::Section(index) => write!(f, "section#{index}"),
            Self::Segment(index) => write!(f, "segment#{index}"),
            Self::MemoryArea(index) => write!(f, "memory#{index}"),
            Self::ULabel(index) => write!(f, "ulabel#{index}"),
            Self::Unary(op, operand) => {
                let spelling = op.spelling();
                if spelling.starts_with('.') {
                    write!(f, "{spelling}({operand})")
                } else {
                    write!(f, "{spelling}{operand}")
                }
            }
            Self::Binary(op @ (BinaryOp::Max | BinaryOp::Min), lhs, rhs) => {
                write!(f, "{}({lhs}, {rhs})", op.spelling())
            }
            Self::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.spelling()),
        }
    }
}
