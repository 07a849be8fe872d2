//! The typed AST produced by the parser.

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Named(String),
    Array {
        lo: i64,
        hi: i64,
        base: Box<TypeRef>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclNode {
    pub name: String,
    pub type_ref: TypeRef,
    pub init: Option<AstNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    IntDiv,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    /// `None` for a positional argument, `Some(name)` for `name := expr`.
    pub name: Option<String>,
    pub value: AstNode,
}

/// Node variants exactly as named in the ST language design: `Program,
/// VarDecl, Assign, Call, CallExpr, If, While, For, Number, String, Bool,
/// Var, MemberAccess, ArrayRef, Binary, Unary, Nop`.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Program {
        name: Option<String>,
        body: Vec<AstNode>,
    },
    VarDecl(VarDeclNode),
    Assign {
        target: Box<AstNode>,
        value: Box<AstNode>,
    },
    /// A statement-position call (return value discarded).
    Call {
        name: String,
        args: Vec<CallArg>,
    },
    /// An expression-position call (e.g. `TO_INT(x)` used in an
    /// expression).
    CallExpr {
        name: String,
        args: Vec<CallArg>,
    },
    If {
        branches: Vec<(AstNode, Vec<AstNode>)>,
        else_branch: Vec<AstNode>,
    },
    While {
        cond: Box<AstNode>,
        body: Vec<AstNode>,
    },
    For {
        var: String,
        start: Box<AstNode>,
        end: Box<AstNode>,
        step: Box<AstNode>,
        body: Vec<AstNode>,
    },
    Number(f64),
    String(String),
    Bool(bool),
    Var(String),
    MemberAccess {
        base: Box<AstNode>,
        member: String,
    },
    ArrayRef {
        base: Box<AstNode>,
        index: Box<AstNode>,
    },
    Binary {
        op: BinOp,
        lhs: Box<AstNode>,
        rhs: Box<AstNode>,
    },
    Unary {
        op: UnOp,
        expr: Box<AstNode>,
    },
    Nop,
}
