//! Built-in expression-language backend.
//!
//! An ECMAScript-flavored language over `serde_json::Value`:
//!
//! - arithmetic (`+ - * / %`); `+` concatenates when either operand is a
//!   string, with integral numbers rendered without a decimal point
//! - comparisons (`== != < <= > >=`); numbers compare numerically,
//!   strings lexicographically
//! - boolean logic (`&& || !`) over truthiness: null, false, zero, empty
//!   strings/arrays/objects are falsy, everything else truthy
//! - variable references and `a.b.c` property paths; an undefined
//!   top-level variable is an error, an undefined property of a defined
//!   structured value is null
//! - scripts: `;`/newline-separated statements with assignment and
//!   `if`/`else`; all writes are staged and committed only when the whole
//!   script succeeds, so a failed script leaves the context untouched

use crate::context::{ContextArena, ScopeId};
use crate::error::ExpressionError;
use crate::evaluator::Evaluator;
use crate::parser::{self, BinOp, Expr, Stmt, UnaryOp};
use serde_json::Value;
use std::collections::HashMap;

/// The built-in evaluator, registered under the kinds `"expr"` and
/// `"ecmascript"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl ExprEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for ExprEvaluator {
    fn eval(
        &self,
        ctx: &ContextArena,
        scope: ScopeId,
        expr: &str,
    ) -> Result<Value, ExpressionError> {
        let ast = parser::parse_expression(expr)
            .map_err(|reason| ExpressionError::new(expr, reason))?;
        let env = ReadEnv { ctx, scope };
        eval_expr(&ast, &env).map_err(|reason| ExpressionError::new(expr, reason))
    }

    fn eval_cond(
        &self,
        ctx: &ContextArena,
        scope: ScopeId,
        expr: &str,
    ) -> Result<bool, ExpressionError> {
        self.eval(ctx, scope, expr).map(|v| is_truthy(&v))
    }

    fn eval_script(
        &self,
        ctx: &mut ContextArena,
        scope: ScopeId,
        script: &str,
    ) -> Result<Value, ExpressionError> {
        let stmts =
            parser::parse_script(script).map_err(|reason| ExpressionError::new(script, reason))?;
        let mut env = ScriptEnv {
            ctx,
            scope,
            staged: HashMap::new(),
        };
        let result =
            exec_stmts(&stmts, &mut env).map_err(|reason| ExpressionError::new(script, reason))?;
        let staged = env.staged;
        for (target, vars) in staged {
            ctx.insert_all(target, vars);
        }
        Ok(result)
    }
}

/// Variable resolution used by expression evaluation; scripts layer
/// staged writes on top.
trait VarEnv {
    fn read(&self, name: &str) -> Option<Value>;
}

struct ReadEnv<'a> {
    ctx: &'a ContextArena,
    scope: ScopeId,
}

impl VarEnv for ReadEnv<'_> {
    fn read(&self, name: &str) -> Option<Value> {
        self.ctx.get(self.scope, name).cloned()
    }
}

struct ScriptEnv<'a> {
    ctx: &'a ContextArena,
    scope: ScopeId,
    /// Writes staged per target scope, committed after the script
    /// completes.
    staged: HashMap<ScopeId, HashMap<String, Value>>,
}

impl ScriptEnv<'_> {
    fn chain(&self) -> Vec<ScopeId> {
        let mut out = vec![self.scope];
        let mut cur = self.scope;
        while let Some(p) = self.ctx.parent(cur) {
            out.push(p);
            cur = p;
        }
        out
    }

    fn write(&mut self, path: &[String], value: Value) -> Result<(), String> {
        let name = &path[0];
        let target = self
            .chain()
            .into_iter()
            .find(|&s| {
                self.staged
                    .get(&s)
                    .is_some_and(|vars| vars.contains_key(name))
                    || self.ctx.get_local(s, name).is_some()
            })
            .unwrap_or(self.scope);

        let staged_value = if path.len() == 1 {
            value
        } else {
            let mut root = self
                .read(name)
                .ok_or_else(|| format!("undefined variable '{}'", name))?;
            set_path(&mut root, &path[1..], value)?;
            root
        };
        self.staged
            .entry(target)
            .or_default()
            .insert(name.clone(), staged_value);
        Ok(())
    }
}

impl VarEnv for ScriptEnv<'_> {
    fn read(&self, name: &str) -> Option<Value> {
        for s in self.chain() {
            if let Some(v) = self.staged.get(&s).and_then(|vars| vars.get(name)) {
                return Some(v.clone());
            }
            if let Some(v) = self.ctx.get_local(s, name) {
                return Some(v.clone());
            }
        }
        None
    }
}

fn set_path(root: &mut Value, path: &[String], value: Value) -> Result<(), String> {
    let mut cur = root;
    for seg in &path[..path.len() - 1] {
        cur = match cur {
            Value::Object(map) => map
                .get_mut(seg.as_str())
                .ok_or_else(|| format!("cannot assign through undefined property '{}'", seg))?,
            _ => return Err(format!("cannot assign through non-object at '{}'", seg)),
        };
    }
    let last = &path[path.len() - 1];
    match cur {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        _ => Err(format!("cannot set property '{}' on a non-object", last)),
    }
}

fn exec_stmts(stmts: &[Stmt], env: &mut ScriptEnv<'_>) -> Result<Value, String> {
    let mut last = Value::Null;
    for stmt in stmts {
        last = exec_stmt(stmt, env)?;
    }
    Ok(last)
}

fn exec_stmt(stmt: &Stmt, env: &mut ScriptEnv<'_>) -> Result<Value, String> {
    match stmt {
        Stmt::Expr(e) => eval_expr(e, env),
        Stmt::Assign { path, expr } => {
            let value = eval_expr(expr, env)?;
            env.write(path, value.clone())?;
            Ok(value)
        }
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            if is_truthy(&eval_expr(cond, env)?) {
                exec_stmts(then, env)
            } else {
                exec_stmts(otherwise, env)
            }
        }
    }
}

fn eval_expr(expr: &Expr, env: &dyn VarEnv) -> Result<Value, String> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => env
            .read(name)
            .ok_or_else(|| format!("undefined variable '{}'", name)),
        Expr::Member(obj, prop) => {
            let value = eval_expr(obj, env)?;
            Ok(match value {
                Value::Object(map) => map.get(prop.as_str()).cloned().unwrap_or(Value::Null),
                // Property access on anything else yields null, matching
                // the chain-tolerant lookup of the guard language.
                _ => Value::Null,
            })
        }
        Expr::Unary(UnaryOp::Not, inner) => {
            Ok(Value::Bool(!is_truthy(&eval_expr(inner, env)?)))
        }
        Expr::Unary(UnaryOp::Neg, inner) => {
            let v = eval_expr(inner, env)?;
            let n = as_number(&v).ok_or("cannot negate a non-number")?;
            number_value(-n)
        }
        Expr::Binary(op, left, right) => eval_binary(*op, left, right, env),
    }
}

fn eval_binary(op: BinOp, left: &Expr, right: &Expr, env: &dyn VarEnv) -> Result<Value, String> {
    // Short-circuit logic first; both operands coerce to booleans.
    match op {
        BinOp::And => {
            let l = eval_expr(left, env)?;
            if !is_truthy(&l) {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(is_truthy(&eval_expr(right, env)?)));
        }
        BinOp::Or => {
            let l = eval_expr(left, env)?;
            if is_truthy(&l) {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(is_truthy(&eval_expr(right, env)?)));
        }
        _ => {}
    }

    let l = eval_expr(left, env)?;
    let r = eval_expr(right, env)?;
    match op {
        BinOp::Add => {
            if l.is_string() || r.is_string() {
                return Ok(Value::String(format!("{}{}", to_display(&l), to_display(&r))));
            }
            let (a, b) = both_numbers(&l, &r, "+")?;
            number_value(a + b)
        }
        BinOp::Sub => {
            let (a, b) = both_numbers(&l, &r, "-")?;
            number_value(a - b)
        }
        BinOp::Mul => {
            let (a, b) = both_numbers(&l, &r, "*")?;
            number_value(a * b)
        }
        BinOp::Div => {
            let (a, b) = both_numbers(&l, &r, "/")?;
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            number_value(a / b)
        }
        BinOp::Mod => {
            let (a, b) = both_numbers(&l, &r, "%")?;
            if b == 0.0 {
                return Err("modulo by zero".to_string());
            }
            number_value(a % b)
        }
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::Lt => compare(&l, &r, |o| o == std::cmp::Ordering::Less),
        BinOp::Le => compare(&l, &r, |o| o != std::cmp::Ordering::Greater),
        BinOp::Gt => compare(&l, &r, |o| o == std::cmp::Ordering::Greater),
        BinOp::Ge => compare(&l, &r, |o| o != std::cmp::Ordering::Less),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn compare(l: &Value, r: &Value, pick: fn(std::cmp::Ordering) -> bool) -> Result<Value, String> {
    let ordering = match (l, r) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            let (a, b) = both_numbers(l, r, "comparison")?;
            a.partial_cmp(&b)
                .ok_or("numbers are not comparable")?
        }
    };
    Ok(Value::Bool(pick(ordering)))
}

fn both_numbers(l: &Value, r: &Value, op: &str) -> Result<(f64, f64), String> {
    match (as_number(l), as_number(r)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(format!("'{}' requires numeric operands", op)),
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Builds a numeric value, keeping integral results as integers so they
/// render without a decimal point.
fn number_value(n: f64) -> Result<Value, String> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Ok(Value::Number((n as i64).into()));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| "result is not a representable number".to_string())
}

/// Truthiness coercion used by `eval_cond` and boolean operators.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .map(|(a, b)| (a - b).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn to_display(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // Structured values render as compact JSON.
        other => other.to_string(),
    }
}
