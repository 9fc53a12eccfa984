//! Process-wide table of external function callbacks.
//!
//! Tokens are handed out once per function identity and never change for
//! the life of the process. Tapes only store tokens; replay looks the
//! callbacks up here.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::error::{fatal, stream_position, TapeError};
use crate::float::Float;

use super::{DeleteContext, ReplayContext};

/// Key of a registered external function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token(u32);

impl Token {
    /// Sentinel for "not registered yet".
    pub const INVALID: Token = Token(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Token::INVALID
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl Default for Token {
    fn default() -> Self {
        Token::INVALID
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Forward-mode replay of one record.
pub type ForwardFn<F> = fn(&mut ReplayContext<'_, F>);
/// Reverse-mode replay of one record.
pub type ReverseFn<F> = fn(&mut ReplayContext<'_, F>);
/// Release of one record's auxiliary resources.
pub type DeleteFn<F> = fn(&mut DeleteContext<'_, F>);

/// Callback triple stored in the registry.
#[derive(Clone, Copy)]
pub struct ExternalFunctionEntry<F: Float> {
    pub name: &'static str,
    pub forward: ForwardFn<F>,
    pub reverse: ReverseFn<F>,
    pub delete: DeleteFn<F>,
}

impl<F: Float> fmt::Debug for ExternalFunctionEntry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFunctionEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Registry {
    entries: Vec<Arc<dyn Any + Send + Sync>>,
    by_identity: HashMap<TypeId, Token>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// Register a callback triple under `identity`.
///
/// The first call for an identity creates the token; every later call
/// returns the same token and ignores `entry`. Registration is serialized
/// by a write lock, so racing threads still see a single token.
pub fn register_external_function<F: Float>(
    identity: TypeId,
    entry: ExternalFunctionEntry<F>,
) -> Token {
    if let Some(&token) = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .by_identity
        .get(&identity)
    {
        return token;
    }

    let mut reg = registry().write().unwrap_or_else(PoisonError::into_inner);
    if let Some(&token) = reg.by_identity.get(&identity) {
        return token;
    }
    let index = stream_position(reg.entries.len(), "external function registry");
    assert!(index < u32::MAX, "too many external functions");
    let token = Token(index);
    reg.entries.push(Arc::new(entry));
    reg.by_identity.insert(identity, token);
    log::debug!("registered external function '{}' as {}", entry.name, token);
    token
}

/// Callbacks for `token`. Unknown tokens, or tokens registered for another
/// real type, are fatal.
pub fn lookup<F: Float>(token: Token) -> ExternalFunctionEntry<F> {
    let reg = registry().read().unwrap_or_else(PoisonError::into_inner);
    match reg
        .entries
        .get(token.0 as usize)
        .and_then(|e| e.downcast_ref::<ExternalFunctionEntry<F>>())
    {
        Some(entry) => *entry,
        None => fatal(TapeError::UnknownToken { token: token.0 }),
    }
}

/// Number of registered external functions, across all real types.
pub fn registered_count() -> usize {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .entries
        .len()
}

/// A hand-written derivative kernel recorded as a single tape entry.
///
/// The implementing type is the function's identity: one token per type.
/// Generic kernels get one token per instantiation.
pub trait ExternalFunction<F: Float>: 'static {
    const NAME: &'static str;

    fn forward(ctx: &mut ReplayContext<'_, F>);

    fn reverse(ctx: &mut ReplayContext<'_, F>);

    fn delete(ctx: &mut DeleteContext<'_, F>);

    /// Token of this function, registering it on first use.
    fn token() -> Token
    where
        Self: Sized,
    {
        register_external_function::<F>(
            TypeId::of::<Self>(),
            ExternalFunctionEntry {
                name: Self::NAME,
                forward: Self::forward,
                reverse: Self::reverse,
                delete: Self::delete,
            },
        )
    }
}
