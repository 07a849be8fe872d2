//! The ST interpreter: variable cells, expression evaluation, statement
//! execution, and the built-in function-block library.

use std::collections::HashMap;

use shadowforge_core::{Error, Result};
use shadowforge_lang::ast::{AstNode, BinOp, CallArg, TypeRef, UnOp};

use crate::value::{FbInstance, Value};

/// While-loop guard count: abort with a runtime error past this many
/// iterations to protect the scheduler (§4.2).
const WHILE_GUARD: u64 = 100_000;

/// The narrow, inspectable glue API between the scan-cycle engine and the
/// interpreter (§9 Design Notes): `stepOnce`, `writeVariable`,
/// `readVariable`, `snapshotVariables`. No hidden global state.
pub struct Interpreter {
    cells: HashMap<String, Value>,
    program: Vec<AstNode>,
    /// Wall-clock ms supplied by the engine for timer/edge FBs.
    pub now_ms: i64,
}

impl Interpreter {
    /// Load a parsed program: allocate a cell for every `VarDecl`
    /// encountered at any nesting depth and capture the top-level
    /// statement list.
    pub fn load(ast: &AstNode) -> Result<Self> {
        let mut interp = Interpreter {
            cells: HashMap::new(),
            program: Vec::new(),
            now_ms: 0,
        };
        let AstNode::Program { body, .. } = ast else {
            return Err(Error::RuntimeError("expected Program node".into()));
        };
        for node in body {
            if let AstNode::VarDecl(decl) = node {
                let value = match &decl.init {
                    Some(expr) => {
                        let default = default_value_for(&decl.type_ref);
                        interp.eval(expr)?.coerce_to(&default)
                    }
                    None => default_value_for(&decl.type_ref),
                };
                interp.cells.insert(decl.name.clone(), value);
            } else {
                interp.program.push(node.clone());
            }
        }
        Ok(interp)
    }

    pub fn read_variable(&self, name: &str) -> Option<&Value> {
        self.cells.get(name)
    }

    pub fn write_variable(&mut self, name: &str, value: Value) {
        let coerced = match self.cells.get(name) {
            Some(existing) => value.coerce_to(existing),
            None => value,
        };
        self.cells.insert(name.to_string(), coerced);
    }

    pub fn snapshot_variables(&self) -> HashMap<String, Value> {
        self.cells.clone()
    }

    pub fn cell_names(&self) -> impl Iterator<Item = &String> {
        self.cells.keys()
    }

    /// Execute the top-level statement list once.
    pub fn step_once(&mut self) -> Result<()> {
        let program = self.program.clone();
        for stmt in &program {
            self.exec(stmt)?;
        }
        Ok(())
    }

    /// Tear down all variable cells and re-evaluate declarations'
    /// initialisers, per the `reset` semantics in §5. The compiled program
    /// (statement list) is retained.
    pub fn reset(&mut self, ast: &AstNode) -> Result<()> {
        let fresh = Interpreter::load(ast)?;
        self.cells = fresh.cells;
        Ok(())
    }

    fn exec(&mut self, node: &AstNode) -> Result<()> {
        match node {
            AstNode::Nop | AstNode::VarDecl(_) => Ok(()),
            AstNode::Assign { target, value } => {
                let v = self.eval(value)?;
                self.assign(target, v)
            }
            AstNode::Call { name, args } => {
                self.eval_call(name, args)?;
                Ok(())
            }
            AstNode::If {
                branches,
                else_branch,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.as_bool() {
                        for stmt in body {
                            self.exec(stmt)?;
                        }
                        return Ok(());
                    }
                }
                for stmt in else_branch {
                    self.exec(stmt)?;
                }
                Ok(())
            }
            AstNode::While { cond, body } => {
                let mut guard = 0u64;
                while self.eval(cond)?.as_bool() {
                    for stmt in body {
                        self.exec(stmt)?;
                    }
                    guard += 1;
                    if guard >= WHILE_GUARD {
                        return Err(Error::RuntimeError("possible infinite loop".into()));
                    }
                }
                Ok(())
            }
            AstNode::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start_v = self.eval(start)?.as_int();
                let end_v = self.eval(end)?.as_int();
                let step_v = self.eval(step)?.as_int();
                let step_v = if step_v == 0 { 1 } else { step_v };
                let mut i = start_v;
                self.cells.insert(var.clone(), Value::Int(i));
                while (step_v > 0 && i <= end_v) || (step_v < 0 && i >= end_v) {
                    self.cells.insert(var.clone(), Value::Int(i));
                    for stmt in body {
                        self.exec(stmt)?;
                    }
                    i += step_v;
                }
                Ok(())
            }
            other => Err(Error::RuntimeError(format!(
                "{other:?} is not a statement"
            ))),
        }
    }

    fn assign(&mut self, target: &AstNode, value: Value) -> Result<()> {
        match target {
            AstNode::Var(name) => {
                self.write_variable(name, value);
                Ok(())
            }
            AstNode::ArrayRef { base, index } => {
                let AstNode::Var(name) = base.as_ref() else {
                    return Err(Error::RuntimeError(
                        "array assignment target must be a variable".into(),
                    ));
                };
                let idx = self.eval(index)?.as_int();
                let Some(Value::Array(items)) = self.cells.get_mut(name) else {
                    return Err(Error::RuntimeError(format!("{name} is not an array")));
                };
                let idx = idx as usize;
                if idx >= items.len() {
                    return Err(Error::RuntimeError(format!(
                        "array index {idx} out of range for {name}"
                    )));
                }
                let coerced = value.coerce_to(&items[idx]);
                items[idx] = coerced;
                Ok(())
            }
            AstNode::MemberAccess { base, member } => {
                let AstNode::Var(name) = base.as_ref() else {
                    return Err(Error::RuntimeError(
                        "member assignment target must be a variable".into(),
                    ));
                };
                let Some(Value::FbInstance(fb)) = self.cells.get_mut(name) else {
                    return Err(Error::RuntimeError(format!(
                        "{name} is not a function-block instance"
                    )));
                };
                match member.to_ascii_uppercase().as_str() {
                    "Q" => fb.q = value.as_bool(),
                    "ET" => fb.et = value.as_int(),
                    _ => {
                        fb.state.insert(member.clone(), value);
                    }
                }
                Ok(())
            }
            other => Err(Error::RuntimeError(format!(
                "{other:?} is not an assignable target"
            ))),
        }
    }

    fn eval(&mut self, node: &AstNode) -> Result<Value> {
        match node {
            AstNode::Number(n) => Ok(Value::Real(*n)),
            AstNode::String(s) => Ok(Value::Str(s.clone())),
            AstNode::Bool(b) => Ok(Value::Bool(*b)),
            AstNode::Var(name) => self
                .cells
                .get(name)
                .cloned()
                .ok_or_else(|| Error::RuntimeError(format!("unknown variable {name}"))),
            AstNode::MemberAccess { base, member } => {
                let base_val = self.eval(base)?;
                match base_val {
                    Value::FbInstance(fb) => match member.to_ascii_uppercase().as_str() {
                        "Q" => Ok(Value::Bool(fb.q)),
                        "ET" => Ok(Value::Int(fb.et)),
                        other => fb
                            .state
                            .get(other)
                            .cloned()
                            .ok_or_else(|| Error::RuntimeError(format!("unknown member {member}"))),
                    },
                    _ => Err(Error::RuntimeError(format!(
                        "{member} is not a member of a non-FB value"
                    ))),
                }
            }
            AstNode::ArrayRef { base, index } => {
                let base_val = self.eval(base)?;
                let idx = self.eval(index)?.as_int() as usize;
                match base_val {
                    Value::Array(items) => items
                        .get(idx)
                        .cloned()
                        .ok_or_else(|| Error::RuntimeError("array index out of range".into())),
                    _ => Err(Error::RuntimeError("indexing a non-array value".into())),
                }
            }
            AstNode::Unary { op, expr } => {
                let v = self.eval(expr)?;
                Ok(match op {
                    UnOp::Neg => Value::Real(-v.as_real()),
                    UnOp::Not => Value::Bool(!v.as_bool()),
                })
            }
            AstNode::Binary { op, lhs, rhs } => self.eval_binary(op, lhs, rhs),
            AstNode::CallExpr { name, args } => self.eval_call(name, args),
            other => Err(Error::RuntimeError(format!(
                "{other:?} is not an expression"
            ))),
        }
    }

    fn eval_binary(&mut self, op: &BinOp, lhs: &AstNode, rhs: &AstNode) -> Result<Value> {
        let l = self.eval(lhs)?;
        let r = self.eval(rhs)?;
        Ok(match op {
            BinOp::Add => Value::Real(l.as_real() + r.as_real()),
            BinOp::Sub => Value::Real(l.as_real() - r.as_real()),
            BinOp::Mul => Value::Real(l.as_real() * r.as_real()),
            BinOp::Div => Value::Real(l.as_real() / r.as_real()),
            BinOp::IntDiv => {
                let rv = r.as_int();
                if rv == 0 {
                    return Err(Error::RuntimeError("division by zero".into()));
                }
                Value::Int(l.as_int() / rv)
            }
            BinOp::Mod => {
                let rv = r.as_int();
                if rv == 0 {
                    return Err(Error::RuntimeError("division by zero".into()));
                }
                Value::Int(l.as_int() % rv)
            }
            BinOp::Eq => Value::Bool(values_equal(&l, &r)),
            BinOp::Ne => Value::Bool(!values_equal(&l, &r)),
            BinOp::Lt => Value::Bool(l.as_real() < r.as_real()),
            BinOp::Gt => Value::Bool(l.as_real() > r.as_real()),
            BinOp::Le => Value::Bool(l.as_real() <= r.as_real()),
            BinOp::Ge => Value::Bool(l.as_real() >= r.as_real()),
            BinOp::And => Value::Bool(l.as_bool() && r.as_bool()),
            BinOp::Or => Value::Bool(l.as_bool() || r.as_bool()),
        })
    }

    fn eval_call(&mut self, name: &str, args: &[CallArg]) -> Result<Value> {
        let upper = name.to_ascii_uppercase();
        if let Some(result) = self.try_stdlib_call(&upper, args)? {
            return Ok(result);
        }
        // A call to a bare identifier whose cell already holds a function
        // block instance dispatches to the timer/edge handler for that
        // instance's `fb_type` (§4.2).
        if let Some(Value::FbInstance(fb)) = self.cells.get(name).cloned() {
            return self.dispatch_fb(name, &fb.fb_type, args);
        }
        Err(Error::RuntimeError(format!("unknown function block {name}")))
    }

    fn try_stdlib_call(&mut self, upper: &str, args: &[CallArg]) -> Result<Option<Value>> {
        let first = || args.first().map(|a| a.value.clone());
        Ok(match upper {
            "TO_BOOL" => {
                let v = self.eval(&first().ok_or_else(no_arg)?)?;
                Some(Value::Bool(v.as_bool()))
            }
            "TO_INT" => {
                let v = self.eval(&first().ok_or_else(no_arg)?)?;
                Some(Value::Int(v.as_int()))
            }
            "TO_REAL" => {
                let v = self.eval(&first().ok_or_else(no_arg)?)?;
                Some(Value::Real(v.as_real()))
            }
            "NOW_MS" => Some(Value::Int(self.now_ms)),
            _ => None,
        })
    }

    /// Dispatch a function-block call keyed by FB type name (§4.2). Timer
    /// blocks accept `IN:BOOL, PT:ms` and return `{Q, ET}`; edge-trigger
    /// blocks observe the clock signal and return `{Q=rising|falling}`.
    fn dispatch_fb(&mut self, instance_name: &str, fb_type: &str, args: &[CallArg]) -> Result<Value> {
        let mut named = HashMap::new();
        for arg in args {
            let key = arg
                .name
                .clone()
                .unwrap_or_default()
                .to_ascii_uppercase();
            let value = self.eval(&arg.value)?;
            named.insert(key, value);
        }

        let now_ms = self.now_ms;
        let Some(Value::FbInstance(fb)) = self.cells.get_mut(instance_name) else {
            return Err(Error::RuntimeError(format!(
                "{instance_name} is not a function-block instance"
            )));
        };

        match fb_type.to_ascii_uppercase().as_str() {
            "TON" => {
                let input = named.get("IN").map(|v| v.as_bool()).unwrap_or(false);
                let preset = named.get("PT").map(|v| v.as_int()).unwrap_or(0);
                run_ton(fb, input, preset, now_ms);
            }
            "TOF" => {
                let input = named.get("IN").map(|v| v.as_bool()).unwrap_or(false);
                let preset = named.get("PT").map(|v| v.as_int()).unwrap_or(0);
                run_tof(fb, input, preset, now_ms);
            }
            "TP" => {
                let input = named.get("IN").map(|v| v.as_bool()).unwrap_or(false);
                let preset = named.get("PT").map(|v| v.as_int()).unwrap_or(0);
                run_tp(fb, input, preset, now_ms);
            }
            "R_TRIG" => {
                let clk = named.get("CLK").map(|v| v.as_bool()).unwrap_or(false);
                run_r_trig(fb, clk);
            }
            "F_TRIG" => {
                let clk = named.get("CLK").map(|v| v.as_bool()).unwrap_or(false);
                run_f_trig(fb, clk);
            }
            other => {
                return Err(Error::RuntimeError(format!(
                    "unknown function block type {other}"
                )))
            }
        }
        Ok(Value::FbInstance(fb.clone()))
    }
}

fn no_arg() -> Error {
    Error::RuntimeError("missing argument".into())
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(_), _) | (_, Value::Str(_)) => a.as_string() == b.as_string(),
        _ => a.as_real() == b.as_real(),
    }
}

fn default_value_for(type_ref: &TypeRef) -> Value {
    match type_ref {
        TypeRef::Named(name) => Value::default_for_type(name),
        TypeRef::Array { lo, hi, base } => {
            let len = (hi - lo + 1).max(0) as usize;
            let base_default = default_value_for(base);
            Value::Array(vec![base_default; len])
        }
    }
}

fn run_ton(fb: &mut FbInstance, input: bool, preset_ms: i64, now_ms: i64) {
    let was_running = fb.state.get("running").map(|v| v.as_bool()).unwrap_or(false);
    if input {
        if !was_running {
            fb.state.insert("start_ms".into(), Value::Int(now_ms));
            fb.state.insert("running".into(), Value::Bool(true));
        }
        let start = fb.state.get("start_ms").map(|v| v.as_int()).unwrap_or(now_ms);
        fb.et = (now_ms - start).min(preset_ms).max(0);
        fb.q = fb.et >= preset_ms;
    } else {
        fb.state.insert("running".into(), Value::Bool(false));
        fb.et = 0;
        fb.q = false;
    }
}

fn run_tof(fb: &mut FbInstance, input: bool, preset_ms: i64, now_ms: i64) {
    let was_input = fb.state.get("prev_in").map(|v| v.as_bool()).unwrap_or(false);
    if input {
        fb.q = true;
        fb.et = 0;
    } else {
        if was_input {
            fb.state.insert("fall_ms".into(), Value::Int(now_ms));
        }
        let fall = fb.state.get("fall_ms").map(|v| v.as_int()).unwrap_or(now_ms);
        fb.et = (now_ms - fall).min(preset_ms).max(0);
        fb.q = fb.et < preset_ms;
    }
    fb.state.insert("prev_in".into(), Value::Bool(input));
}

fn run_tp(fb: &mut FbInstance, input: bool, preset_ms: i64, now_ms: i64) {
    let was_input = fb.state.get("prev_in").map(|v| v.as_bool()).unwrap_or(false);
    let pulsing = fb.state.get("pulsing").map(|v| v.as_bool()).unwrap_or(false);
    if input && !was_input && !pulsing {
        fb.state.insert("start_ms".into(), Value::Int(now_ms));
        fb.state.insert("pulsing".into(), Value::Bool(true));
    }
    if fb.state.get("pulsing").map(|v| v.as_bool()).unwrap_or(false) {
        let start = fb.state.get("start_ms").map(|v| v.as_int()).unwrap_or(now_ms);
        fb.et = (now_ms - start).min(preset_ms).max(0);
        fb.q = fb.et < preset_ms;
        if fb.et >= preset_ms {
            fb.state.insert("pulsing".into(), Value::Bool(false));
        }
    } else {
        fb.q = false;
    }
    fb.state.insert("prev_in".into(), Value::Bool(input));
}

fn run_r_trig(fb: &mut FbInstance, clk: bool) {
    let prev = fb.state.get("prev_clk").map(|v| v.as_bool()).unwrap_or(false);
    fb.q = clk && !prev;
    fb.state.insert("prev_clk".into(), Value::Bool(clk));
}

fn run_f_trig(fb: &mut FbInstance, clk: bool) {
    let prev = fb.state.get("prev_clk").map(|v| v.as_bool()).unwrap_or(false);
    fb.q = !clk && prev;
    fb.state.insert("prev_clk".into(), Value::Bool(clk));
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowforge_lang::{parse, tokenize};

    fn load(src: &str) -> Interpreter {
        let ast = parse(tokenize(src).unwrap()).unwrap();
        Interpreter::load(&ast).unwrap()
    }

    #[test]
    fn arithmetic_and_coercion() {
        let mut interp = load("VAR A : INT := 0; END_VAR A := 7 / 2;");
        interp.step_once().unwrap();
        assert_eq!(interp.read_variable("A"), Some(&Value::Int(3)));
    }

    #[test]
    fn timer_reaches_q_after_preset() {
        let mut interp = load(
            "VAR T1 : TON; Start : BOOL := TRUE; END_VAR T1(IN := Start, PT := T#100ms);",
        );
        for cycle in 0..12 {
            interp.now_ms = cycle * 10;
            interp.step_once().unwrap();
        }
        let fb = interp.read_variable("T1").unwrap();
        assert!(matches!(fb, Value::FbInstance(f) if f.q));
    }

    #[test]
    fn while_guard_trips_on_infinite_loop() {
        let mut interp = load("VAR A : BOOL := TRUE; END_VAR WHILE A DO END_WHILE");
        let err = interp.step_once().unwrap_err();
        assert!(matches!(err, Error::RuntimeError(msg) if msg.contains("infinite loop")));
    }

    #[test]
    fn for_loop_accumulates() {
        let mut interp =
            load("VAR A : INT := 0; END_VAR FOR A := 1 TO 5 DO END_FOR");
        interp.step_once().unwrap();
        assert_eq!(interp.read_variable("A"), Some(&Value::Int(5)));
    }
}
