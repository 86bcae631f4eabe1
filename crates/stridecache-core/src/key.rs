//! Query key definitions.
//!
//! A `QueryKey` is a resource name followed by that resource's parameters in
//! a fixed order, e.g. `["recent-podiums", 1, 10]`. UI code addresses cache
//! entries by these literal identifiers, so the names and parameter order are
//! part of the public contract.

use std::fmt;

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::KeyError;

/// A cached resource and its parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    RecentPodiums,
    AllUserWorkouts,
    RunDetail,
    RunningSession,
    UserBrands,
    Leaderboard,
    WorkoutHistory,
    UserWorkouts,
    Workout,
}

impl Resource {
    pub const ALL: [Resource; 9] = [
        Resource::RecentPodiums,
        Resource::AllUserWorkouts,
        Resource::RunDetail,
        Resource::RunningSession,
        Resource::UserBrands,
        Resource::Leaderboard,
        Resource::WorkoutHistory,
        Resource::UserWorkouts,
        Resource::Workout,
    ];

    /// The literal name used as the first key element.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::RecentPodiums => "recent-podiums",
            Resource::AllUserWorkouts => "allUserWorkouts",
            Resource::RunDetail => "runDetail",
            Resource::RunningSession => "runningSession",
            Resource::UserBrands => "userBrands",
            Resource::Leaderboard => "leaderboard",
            Resource::WorkoutHistory => "workoutHistory",
            Resource::UserWorkouts => "userWorkouts",
            Resource::Workout => "workout",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    /// Parameter names, in key order.
    pub fn params(&self) -> &'static [&'static str] {
        match self {
            Resource::RecentPodiums | Resource::AllUserWorkouts | Resource::Leaderboard => {
                &["page", "limit"]
            }
            Resource::RunDetail => &["runId"],
            Resource::RunningSession => &["castHash"],
            Resource::Workout => &["id"],
            Resource::UserBrands | Resource::WorkoutHistory | Resource::UserWorkouts => &[],
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.params().first() == Some(&"page")
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One primitive key parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Int(i64),
    Text(String),
}

impl KeyPart {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            KeyPart::Int(n) => Some(*n),
            KeyPart::Text(_) => None,
        }
    }

    /// Parse a command-line style argument: integers become `Int`.
    pub fn parse(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(KeyPart::Int)
            .unwrap_or_else(|_| KeyPart::Text(raw.to_string()))
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(n) => write!(f, "{}", n),
            KeyPart::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        KeyPart::Int(i64::from(n))
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Text(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Text(s)
    }
}

/// Canonical identifier for a cached read.
///
/// Constructed only through the per-resource constructors or
/// [`QueryKey::from_parts`], which checks arity, so two logically identical
/// requests always serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    resource: Resource,
    params: Vec<KeyPart>,
}

impl QueryKey {
    fn new(resource: Resource, params: Vec<KeyPart>) -> Self {
        debug_assert_eq!(resource.params().len(), params.len());
        Self { resource, params }
    }

    pub fn recent_podiums(page: u32, limit: u32) -> Self {
        Self::new(Resource::RecentPodiums, vec![page.into(), limit.into()])
    }

    pub fn all_user_workouts(page: u32, limit: u32) -> Self {
        Self::new(Resource::AllUserWorkouts, vec![page.into(), limit.into()])
    }

    pub fn run_detail(run_id: impl Into<KeyPart>) -> Self {
        Self::new(Resource::RunDetail, vec![run_id.into()])
    }

    pub fn running_session(cast_hash: impl Into<KeyPart>) -> Self {
        Self::new(Resource::RunningSession, vec![cast_hash.into()])
    }

    pub fn user_brands() -> Self {
        Self::new(Resource::UserBrands, Vec::new())
    }

    pub fn leaderboard(page: u32, limit: u32) -> Self {
        Self::new(Resource::Leaderboard, vec![page.into(), limit.into()])
    }

    pub fn workout_history() -> Self {
        Self::new(Resource::WorkoutHistory, Vec::new())
    }

    pub fn user_workouts() -> Self {
        Self::new(Resource::UserWorkouts, Vec::new())
    }

    pub fn workout(id: impl Into<KeyPart>) -> Self {
        Self::new(Resource::Workout, vec![id.into()])
    }

    /// Build a key from a resource name and loose parameters.
    pub fn from_parts(resource: &str, params: Vec<KeyPart>) -> Result<Self, KeyError> {
        let resource = Resource::from_name(resource)
            .ok_or_else(|| KeyError::UnknownResource(resource.to_string()))?;
        let expected = resource.params().len();
        if params.len() != expected {
            return Err(KeyError::Arity {
                resource: resource.name(),
                expected,
                got: params.len(),
            });
        }
        Ok(Self { resource, params })
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn params(&self) -> &[KeyPart] {
        &self.params
    }

    /// Parameters paired with their names.
    pub fn named_params(&self) -> impl Iterator<Item = (&'static str, &KeyPart)> + '_ {
        self.resource.params().iter().copied().zip(self.params.iter())
    }

    pub fn param(&self, name: &str) -> Option<&KeyPart> {
        self.named_params().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn page(&self) -> Option<i64> {
        self.param("page").and_then(KeyPart::as_int)
    }

    /// The same key pointed at another page.
    pub fn with_page(&self, page: u32) -> Result<Self, KeyError> {
        if !self.resource.is_paginated() {
            return Err(KeyError::NotPaginated(self.resource.name()));
        }
        let mut params = self.params.clone();
        params[0] = page.into();
        Ok(Self::new(self.resource, params))
    }

    /// Canonical serialized form, e.g. `["leaderboard",2,10]`.
    pub fn serialized(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("[\"{}\"]", self.resource))
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(1 + self.params.len()))?;
        seq.serialize_element(self.resource.name())?;
        for part in &self.params {
            seq.serialize_element(part)?;
        }
        seq.end()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized())
    }
}

/// Selects cache entries for invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPattern {
    /// Exactly one key.
    Exact(QueryKey),
    /// Every key of a resource, whatever its parameters.
    Resource(Resource),
}

impl KeyPattern {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::Resource(resource) => key.resource == *resource,
        }
    }
}

impl From<QueryKey> for KeyPattern {
    fn from(key: QueryKey) -> Self {
        KeyPattern::Exact(key)
    }
}

impl From<Resource> for KeyPattern {
    fn from(resource: Resource) -> Self {
        KeyPattern::Resource(resource)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Exact(key) => write!(f, "{}", key),
            KeyPattern::Resource(resource) => write!(f, "[\"{}\", ..]", resource),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_forms_match_literal_keys() {
        assert_eq!(
            QueryKey::recent_podiums(1, 10).serialized(),
            r#"["recent-podiums",1,10]"#
        );
        assert_eq!(QueryKey::user_brands().serialized(), r#"["userBrands"]"#);
        assert_eq!(
            QueryKey::running_session("0xabc").serialized(),
            r#"["runningSession","0xabc"]"#
        );
        assert_eq!(QueryKey::workout("w1").to_string(), r#"["workout","w1"]"#);
    }

    #[test]
    fn test_equality_follows_serialization() {
        assert_eq!(QueryKey::leaderboard(2, 10), QueryKey::leaderboard(2, 10));
        assert_ne!(QueryKey::leaderboard(2, 10), QueryKey::leaderboard(2, 20));
        // A numeric id and its string form serialize differently
        assert_ne!(QueryKey::workout(7i64), QueryKey::workout("7"));
    }

    #[test]
    fn test_from_parts_checks_arity() {
        let key = QueryKey::from_parts("leaderboard", vec![KeyPart::Int(1), KeyPart::Int(5)])
            .expect("valid key");
        assert_eq!(key, QueryKey::leaderboard(1, 5));

        assert_eq!(
            QueryKey::from_parts("runDetail", vec![]),
            Err(KeyError::Arity {
                resource: "runDetail",
                expected: 1,
                got: 0
            })
        );
        assert!(matches!(
            QueryKey::from_parts("nope", vec![]),
            Err(KeyError::UnknownResource(_))
        ));
    }

    #[test]
    fn test_with_page() {
        let key = QueryKey::all_user_workouts(1, 20);
        let next = key.with_page(2).expect("paginated");
        assert_eq!(next, QueryKey::all_user_workouts(2, 20));
        assert_eq!(next.page(), Some(2));

        assert_eq!(
            QueryKey::user_brands().with_page(2),
            Err(KeyError::NotPaginated("userBrands"))
        );
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = KeyPattern::from(Resource::AllUserWorkouts);
        assert!(pattern.matches(&QueryKey::all_user_workouts(1, 10)));
        assert!(pattern.matches(&QueryKey::all_user_workouts(3, 50)));
        assert!(!pattern.matches(&QueryKey::user_workouts()));

        let exact = KeyPattern::from(QueryKey::workout("w1"));
        assert!(exact.matches(&QueryKey::workout("w1")));
        assert!(!exact.matches(&QueryKey::workout("w2")));
    }

    #[test]
    fn test_key_part_parse() {
        assert_eq!(KeyPart::parse("42"), KeyPart::Int(42));
        assert_eq!(KeyPart::parse("0xabc"), KeyPart::Text("0xabc".to_string()));
    }
}
