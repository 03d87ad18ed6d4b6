use parking_lot::RwLock;

use super::error::{EvalError, EvalResult};
use super::{MutationGuard, Value};

/// A mutable, freezable list.
pub struct List {
    elems: RwLock<Vec<Value>>,
    guard: MutationGuard,
}

impl List {
    pub fn new(elems: Vec<Value>) -> Self {
        Self {
            elems: RwLock::new(elems),
            guard: MutationGuard::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.elems.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.elems.read().get(index).cloned()
    }

    /// A copy of the current elements.
    pub fn snapshot(&self) -> Vec<Value> {
        self.elems.read().clone()
    }

    pub fn with_elems<R>(&self, f: impl FnOnce(&[Value]) -> R) -> R {
        f(&self.elems.read())
    }

    pub fn is_frozen(&self) -> bool {
        self.guard.is_frozen()
    }

    pub(crate) fn guard(&self) -> &MutationGuard {
        &self.guard
    }

    pub fn freeze(&self) {
        if self.guard.freeze() {
            for v in self.elems.read().iter() {
                v.freeze();
            }
        }
    }

    pub fn append(&self, v: Value) -> EvalResult<()> {
        self.guard.check("append to", "list")?;
        self.elems.write().push(v);
        Ok(())
    }

    pub fn extend(&self, vs: Vec<Value>) -> EvalResult<()> {
        self.guard.check("extend", "list")?;
        self.elems.write().extend(vs);
        Ok(())
    }

    /// Inserts before `index`, clamped to the list bounds.
    pub fn insert(&self, index: usize, v: Value) -> EvalResult<()> {
        self.guard.check("insert into", "list")?;
        let mut elems = self.elems.write();
        let index = index.min(elems.len());
        elems.insert(index, v);
        Ok(())
    }

    pub fn set(&self, index: usize, v: Value) -> EvalResult<()> {
        self.guard.check("assign to element of", "list")?;
        let mut elems = self.elems.write();
        let len = elems.len();
        match elems.get_mut(index) {
            Some(slot) => {
                *slot = v;
                Ok(())
            }
            None => Err(EvalError::new(format!("index {} out of range [0:{}]", index, len))),
        }
    }

    pub fn remove_at(&self, index: usize) -> EvalResult<Value> {
        self.guard.check("pop from", "list")?;
        let mut elems = self.elems.write();
        if index >= elems.len() {
            return Err(EvalError::new(format!(
                "index {} out of range [0:{}]",
                index,
                elems.len()
            )));
        }
        Ok(elems.remove(index))
    }

    pub fn clear(&self) -> EvalResult<()> {
        self.guard.check("clear", "list")?;
        self.elems.write().clear();
        Ok(())
    }

    /// Checks that the list may be mutated, for callers that mutate through
    /// several steps.
    pub fn check_mutable(&self, verb: &str) -> EvalResult<()> {
        self.guard.check(verb, "list")
    }
}
