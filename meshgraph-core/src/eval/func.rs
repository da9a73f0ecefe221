//! Function nodes built from closures.
//!
//! Handy for glue between real node types and for tests: the edges are
//! declared once, at construction, from the ports passed in.
//!
//! ```rust,ignore
//! let times = Value::named("times", 5);
//! let doubled = func::map("double", times.port(), |n| n * 2);
//! let sum = func::map2("sum", times.port(), doubled.port(), |a, b| a + b);
//! assert_eq!(sum.value()?, 15);
//! ```

use super::derived::{Compute, Derived};
use crate::dependencies;
use crate::graph::{Dependencies, Port};

type Func<I, T> = Box<dyn Fn(I) -> anyhow::Result<T> + Send + Sync>;

/// A node with no inputs that computes `value` once.
pub struct Constant<T> {
    name: String,
    value: T,
}

impl<T> Compute for Constant<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies::new()
    }

    fn compute(&self) -> anyhow::Result<T> {
        Ok(self.value.clone())
    }
}

pub struct Map<A, T> {
    name: String,
    input: Port<A>,
    f: Func<A, T>,
}

impl<A, T> Compute for Map<A, T>
where
    A: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Dependencies {
        dependencies!(self => input)
    }

    fn compute(&self) -> anyhow::Result<T> {
        (self.f)(self.input.value()?)
    }
}

pub struct Map2<A, B, T> {
    name: String,
    a: Port<A>,
    b: Port<B>,
    f: Func<(A, B), T>,
}

impl<A, B, T> Compute for Map2<A, B, T>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Dependencies {
        dependencies!(self => a, b)
    }

    fn compute(&self) -> anyhow::Result<T> {
        (self.f)((self.a.value()?, self.b.value()?))
    }
}

pub struct Combine<A, T> {
    name: String,
    inputs: Vec<Port<A>>,
    f: Func<Vec<A>, T>,
}

impl<A, T> Compute for Combine<A, T>
where
    A: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Dependencies {
        dependencies!(self => inputs)
    }

    fn compute(&self) -> anyhow::Result<T> {
        let values = self
            .inputs
            .iter()
            .map(Port::value)
            .collect::<Result<Vec<_>, _>>()?;
        (self.f)(values)
    }
}

pub fn constant<T>(name: impl Into<String>, value: T) -> Derived<Constant<T>>
where
    T: Clone + Send + Sync + 'static,
{
    Derived::new(Constant {
        name: name.into(),
        value,
    })
}

pub fn map<A, T, F>(name: impl Into<String>, input: Port<A>, f: F) -> Derived<Map<A, T>>
where
    A: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(A) -> T + Send + Sync + 'static,
{
    try_map(name, input, move |a| Ok(f(a)))
}

/// Like [`map`], but the closure may fail. The error is captured on the node.
pub fn try_map<A, T, F>(name: impl Into<String>, input: Port<A>, f: F) -> Derived<Map<A, T>>
where
    A: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(A) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Derived::new(Map {
        name: name.into(),
        input,
        f: Box::new(f),
    })
}

pub fn map2<A, B, T, F>(
    name: impl Into<String>,
    a: Port<A>,
    b: Port<B>,
    f: F,
) -> Derived<Map2<A, B, T>>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(A, B) -> T + Send + Sync + 'static,
{
    Derived::new(Map2 {
        name: name.into(),
        a,
        b,
        f: Box::new(move |(a, b)| Ok(f(a, b))),
    })
}

/// Fold any number of same-typed inputs. Edges are named `inputs[i]`.
pub fn combine<A, T, F>(
    name: impl Into<String>,
    inputs: Vec<Port<A>>,
    f: F,
) -> Derived<Combine<A, T>>
where
    A: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(Vec<A>) -> T + Send + Sync + 'static,
{
    Derived::new(Combine {
        name: name.into(),
        inputs,
        f: Box::new(move |values| Ok(f(values))),
    })
}
