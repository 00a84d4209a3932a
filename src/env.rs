//! An in-process stand-in for the instrumented program's stack frame.
//! Tests and the CLI bind variables, functions and opaque lvalues here;
//! a real toolchain binding would implement [`Env`] over actual storage.

use std::collections::BTreeMap;

use crate::error::{IntrospectError, IntrospectResult};
use crate::eval::Env;
use crate::value::Value;

type HostFn = Box<dyn FnMut(&[Value]) -> Value>;

#[derive(Default)]
pub struct MapEnv {
    vars: BTreeMap<String, Value>,
    funcs: BTreeMap<String, HostFn>,
    opaques: BTreeMap<String, Value>,
    addrs: BTreeMap<String, u64>,
    next_addr: u64,
}

impl MapEnv {
    pub fn new() -> Self {
        Self {
            next_addr: 0x7ffc_0000,
            ..Self::default()
        }
    }

    pub fn with_int(mut self, name: impl Into<String>, value: i64) -> Self {
        self.vars.insert(name.into(), Value::int(value));
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    /// Binds a `char *` variable to a string; the pointer gets a synthetic
    /// stable address.
    pub fn with_str(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        let addr = self.fresh_addr();
        self.vars.insert(name.into(), Value::string(addr, text));
        self
    }

    pub fn with_null(mut self, name: impl Into<String>) -> Self {
        self.vars.insert(name.into(), Value::null());
        self
    }

    pub fn with_fn(
        mut self,
        name: impl Into<String>,
        f: impl FnMut(&[Value]) -> Value + 'static,
    ) -> Self {
        self.funcs.insert(name.into(), Box::new(f));
        self
    }

    pub fn with_opaque(mut self, text: impl Into<String>, value: Value) -> Self {
        self.opaques.insert(text.into(), value);
        self
    }

    fn fresh_addr(&mut self) -> u64 {
        let addr = self.next_addr;
        self.next_addr += 0x40;
        addr
    }
}

impl Env for MapEnv {
    fn var(&mut self, name: &str) -> IntrospectResult<Value> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| IntrospectError::evaluation(format!("unknown variable '{name}'")))
    }

    fn call(&mut self, name: &str, args: &[Value]) -> IntrospectResult<Value> {
        let f = self
            .funcs
            .get_mut(name)
            .ok_or_else(|| IntrospectError::evaluation(format!("unknown function '{name}'")))?;
        Ok(f(args))
    }

    fn opaque(&mut self, text: &str) -> IntrospectResult<Value> {
        self.opaques
            .get(text)
            .cloned()
            .ok_or_else(|| IntrospectError::evaluation(format!("unbound subexpression '{text}'")))
    }

    fn address_of(&mut self, name: &str) -> IntrospectResult<u64> {
        if let Some(addr) = self.addrs.get(name) {
            return Ok(*addr);
        }
        let addr = self.fresh_addr();
        self.addrs.insert(name.to_string(), addr);
        Ok(addr)
    }
}
