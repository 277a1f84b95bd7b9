//! Aspect keys, backend ids and directions.
//!
//! Every piece of per-field data lives under an aspect key composed of a
//! three-letter type token, an optional four-letter direction token and an
//! optional backend ("system") id, e.g. `vleFromAcu`. Inside a
//! [`Field`](super::Field) the key is split into an [`AspectType`] and a
//! [`Scope`]; the string form is used at the crate boundary (schema index maps,
//! diagnostics).

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::errors::RecordError;

/// Length of an aspect type token.
pub const ASPECT_TYPE_LEN: usize = 3;
/// Length of a direction token.
pub const ASPECT_DIR_LEN: usize = 4;
/// Minimum length of a system id.
pub const SYSTEM_MIN_LEN: usize = 2;

/// Kind of data stored under an aspect key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AspectType {
    /// Field name (`idx`).
    Name,
    /// Stored value (`vle`).
    Value,
    /// Value restored by `clear_leafs` (`vwc`).
    ClearValue,
    /// Owning root record handle (`rrd`).
    RootRec,
    /// Index path from the root record (`rrx`).
    RootIdx,
    /// Calculated value (`clc`).
    Calculator,
    /// Value check (`chk`).
    Validator,
    /// Value conversion (`cnv`).
    Converter,
    /// Outbound filter (`flt`).
    Filter,
    /// Query expression (`sqc`).
    SqlExpr,
}

impl AspectType {
    pub const ALL: [AspectType; 10] = [
        AspectType::Name,
        AspectType::Value,
        AspectType::ClearValue,
        AspectType::RootRec,
        AspectType::RootIdx,
        AspectType::Calculator,
        AspectType::Validator,
        AspectType::Converter,
        AspectType::Filter,
        AspectType::SqlExpr,
    ];

    pub fn token(self) -> &'static str {
        match self {
            AspectType::Name => "idx",
            AspectType::Value => "vle",
            AspectType::ClearValue => "vwc",
            AspectType::RootRec => "rrd",
            AspectType::RootIdx => "rrx",
            AspectType::Calculator => "clc",
            AspectType::Validator => "chk",
            AspectType::Converter => "cnv",
            AspectType::Filter => "flt",
            AspectType::SqlExpr => "sqc",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.token() == token)
    }
}

impl fmt::Display for AspectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Whether backend data is read from or written onto a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    From,
    Onto,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::From => "From",
            Direction::Onto => "Onto",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "From" => Some(Direction::From),
            "Onto" => Some(Direction::Onto),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::from_token(s).ok_or_else(|| RecordError::InvalidDirection {
            direction: s.to_string(),
        })
    }
}

/// Identifier of an external backend.
///
/// At least two characters, starting with an uppercase ASCII letter and
/// otherwise made of ASCII alphanumerics or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SystemId(String);

impl SystemId {
    pub fn new(id: impl Into<String>) -> Result<Self, RecordError> {
        let id = id.into();
        let invalid = |reason: &str| RecordError::InvalidSystemId {
            id: id.clone(),
            reason: reason.to_string(),
        };
        if id.chars().count() < SYSTEM_MIN_LEN {
            return Err(invalid("too short"));
        }
        if !id.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Err(invalid("must start with an uppercase letter"));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("must be a bare identifier"));
        }
        Ok(SystemId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SystemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SystemId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SystemId::new(s)
    }
}

impl TryFrom<String> for SystemId {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SystemId::new(value)
    }
}

impl TryFrom<&str> for SystemId {
    type Error = RecordError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        SystemId::new(value)
    }
}

impl From<SystemId> for String {
    fn from(id: SystemId) -> Self {
        id.0
    }
}

/// The (system, direction) part of an aspect key.
///
/// The default scope has neither and addresses the canonical,
/// backend-independent aspects of a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope {
    system: Option<SystemId>,
    direction: Option<Direction>,
}

impl Scope {
    /// Scope of canonical aspects.
    pub fn canonical() -> Self {
        Scope::default()
    }

    /// Scope of a backend without a direction.
    pub fn system(system: SystemId) -> Self {
        Scope {
            system: Some(system),
            direction: None,
        }
    }

    pub fn new(system: SystemId, direction: Direction) -> Self {
        Scope {
            system: Some(system),
            direction: Some(direction),
        }
    }

    pub fn from_parts(system: Option<SystemId>, direction: Option<Direction>) -> Self {
        Scope { system, direction }
    }

    pub fn system_id(&self) -> Option<&SystemId> {
        self.system.as_ref()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn is_canonical(&self) -> bool {
        self.system.is_none() && self.direction.is_none()
    }

    /// Same system, other direction.
    pub fn with_direction(&self, direction: Option<Direction>) -> Self {
        Scope {
            system: self.system.clone(),
            direction,
        }
    }

    /// Scopes to probe, in order, when looking up an aspect for this scope.
    ///
    /// Without `flex` only the exact scope is probed. With `flex` a missing
    /// direction probes both directions (`Onto` first), then the
    /// direction-less backend scope, then the canonical scope.
    pub(crate) fn candidates(&self, flex: bool) -> Vec<Scope> {
        if !flex {
            return vec![self.clone()];
        }
        let mut scopes = Vec::with_capacity(4);
        match (&self.system, self.direction) {
            (Some(_), Some(_)) => scopes.push(self.clone()),
            (Some(system), None) => {
                scopes.push(Scope::new(system.clone(), Direction::Onto));
                scopes.push(Scope::new(system.clone(), Direction::From));
            }
            (None, Some(_)) => scopes.push(self.clone()),
            (None, None) => {}
        }
        if let Some(system) = &self.system {
            scopes.push(Scope::system(system.clone()));
        }
        scopes.push(Scope::canonical());
        scopes
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(direction) = self.direction {
            write!(f, "{direction}")?;
        }
        if let Some(system) = &self.system {
            write!(f, "{system}")?;
        }
        Ok(())
    }
}

/// A decomposed aspect key.
///
/// ```rust
/// use sysdata::record::{AspectKey, AspectType, Direction, Scope, SystemId};
///
/// let key = AspectKey::new(
///     AspectType::Value,
///     Scope::new(SystemId::new("Acu").unwrap(), Direction::From),
/// );
/// assert_eq!(key.to_string(), "vleFromAcu");
/// assert_eq!("vleFromAcu".parse::<AspectKey>().unwrap(), key);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AspectKey {
    pub ty: AspectType,
    pub scope: Scope,
}

impl AspectKey {
    pub fn new(ty: AspectType, scope: Scope) -> Self {
        AspectKey { ty, scope }
    }

    pub fn canonical(ty: AspectType) -> Self {
        AspectKey {
            ty,
            scope: Scope::canonical(),
        }
    }

    /// Key with only a direction, matching any system of that direction.
    pub fn directed(ty: AspectType, direction: Direction) -> Self {
        AspectKey {
            ty,
            scope: Scope::from_parts(None, Some(direction)),
        }
    }
}

impl fmt::Display for AspectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.ty, self.scope)
    }
}

impl FromStr for AspectKey {
    type Err = RecordError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RecordError::InvalidAspectKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        let token = key
            .get(..ASPECT_TYPE_LEN)
            .ok_or_else(|| invalid("aspect type is too short"))?;
        let ty = AspectType::from_token(token).ok_or_else(|| invalid("unknown aspect type"))?;
        let direction = direction_of(key);
        let system = system_of(key);
        let system = if system.is_empty() {
            None
        } else {
            Some(SystemId::new(system).map_err(|err| invalid(&err.to_string()))?)
        };
        Ok(AspectKey::new(ty, Scope::from_parts(system, direction)))
    }
}

/// Composes an aspect key string.
pub fn aspect_key(ty: AspectType, system: Option<&SystemId>, direction: Option<Direction>) -> String {
    AspectKey::new(ty, Scope::from_parts(system.cloned(), direction)).to_string()
}

/// System id part of an aspect key; empty when the key has none.
pub fn system_of(key: &str) -> &str {
    let rest = key.get(ASPECT_TYPE_LEN..).unwrap_or("");
    match rest.get(..ASPECT_DIR_LEN).and_then(Direction::from_token) {
        Some(_) => rest.get(ASPECT_DIR_LEN..).unwrap_or(""),
        None => rest,
    }
}

/// Direction part of an aspect key, if any.
pub fn direction_of(key: &str) -> Option<Direction> {
    key.get(ASPECT_TYPE_LEN..ASPECT_TYPE_LEN + ASPECT_DIR_LEN)
        .and_then(Direction::from_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sys(id: &str) -> SystemId {
        SystemId::new(id).unwrap()
    }

    #[test]
    fn test_aspect_key_compose() {
        assert_eq!(
            aspect_key(AspectType::Value, Some(&sys("Acu")), Some(Direction::From)),
            "vleFromAcu"
        );
        assert_eq!(aspect_key(AspectType::Name, None, None), "idx");
        assert_eq!(aspect_key(AspectType::Converter, Some(&sys("Sf")), None), "cnvSf");
        assert_eq!(aspect_key(AspectType::Filter, None, Some(Direction::Onto)), "fltOnto");
    }

    #[test]
    fn test_aspect_key_decompose() {
        assert_eq!(system_of("vleFromAcu"), "Acu");
        assert_eq!(direction_of("vleFromAcu"), Some(Direction::From));
        assert_eq!(system_of("idxSh"), "Sh");
        assert_eq!(direction_of("idxSh"), None);
        assert_eq!(system_of("vle"), "");
        assert_eq!(direction_of("vle"), None);
        assert_eq!(system_of("fltOnto"), "");
        // total over arbitrary input
        assert_eq!(system_of(""), "");
        assert_eq!(direction_of("v"), None);
        assert_eq!(system_of("vä"), "");
    }

    #[test]
    fn test_aspect_key_parse() {
        let key: AspectKey = "cnvOntoSf".parse().unwrap();
        assert_eq!(key.ty, AspectType::Converter);
        assert_eq!(key.scope, Scope::new(sys("Sf"), Direction::Onto));

        assert!("xyz".parse::<AspectKey>().is_err());
        assert!("vleFromz".parse::<AspectKey>().is_err());
        assert!("vl".parse::<AspectKey>().is_err());
    }

    #[test]
    fn test_system_id_validation() {
        assert!(SystemId::new("Acu").is_ok());
        assert!(SystemId::new("Sh_2").is_ok());
        assert!(SystemId::new("Z").is_err());
        assert!(SystemId::new("acu").is_err());
        assert!(SystemId::new("A-u").is_err());
    }

    #[test]
    fn test_scope_candidates() {
        let exact = Scope::new(sys("Acu"), Direction::From);
        assert_eq!(exact.candidates(false), vec![exact.clone()]);
        assert_eq!(
            exact.candidates(true),
            vec![exact.clone(), Scope::system(sys("Acu")), Scope::canonical()]
        );
        assert_eq!(
            Scope::system(sys("Acu")).candidates(true),
            vec![
                Scope::new(sys("Acu"), Direction::Onto),
                Scope::new(sys("Acu"), Direction::From),
                Scope::system(sys("Acu")),
                Scope::canonical(),
            ]
        );
        assert_eq!(Scope::canonical().candidates(true), vec![Scope::canonical()]);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("Onto".parse::<Direction>().unwrap(), Direction::Onto);
        assert!("To".parse::<Direction>().is_err());
    }
}
