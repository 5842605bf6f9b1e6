use arcstr::ArcStr;
use std::{
    borrow::Borrow,
    cmp::{Eq, Ord, PartialEq, PartialOrd},
    convert::{AsRef, From},
    fmt,
    ops::Deref,
    str::FromStr,
};

/// The identifier of one monitored farm sub system, e.g. "AgroFarm"
/// or "CattleFarm". Farm ids are immutable and reference counted,
/// cloning one is cheap. They hash and compare by content, so maps
/// keyed by `FarmId` can be queried with a plain `&str`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FarmId(ArcStr);

impl fmt::Display for FarmId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for FarmId {
    fn as_ref(&self) -> &str {
        &*self.0
    }
}

impl Borrow<str> for FarmId {
    fn borrow(&self) -> &str {
        &*self.0
    }
}

impl Deref for FarmId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<ArcStr> for FarmId {
    fn from(s: ArcStr) -> FarmId {
        FarmId(s)
    }
}

impl From<String> for FarmId {
    fn from(s: String) -> FarmId {
        FarmId(ArcStr::from(s))
    }
}

impl From<&str> for FarmId {
    fn from(s: &str) -> FarmId {
        FarmId(ArcStr::from(s))
    }
}

impl FromStr for FarmId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(FarmId::from(s))
    }
}

impl FarmId {
    pub fn as_str(&self) -> &str {
        &*self.0
    }
}
