use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use super::{FieldValue, ParseError, Record};

/// Category of a remotely managed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    User,
    Group,
    Namespace,
    Repository,
    Branch,
    Member,
    File,
    Milestone,
    GroupShare,
}

/// How a lookup key is compared against a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// Any of the listed fields contains the key.
    Contains(&'static [&'static str]),
    /// The field equals the key.
    Exact(&'static str),
}

impl KeyMatch {
    pub fn matches(&self, record: &Record, key: &str) -> bool {
        match self {
            KeyMatch::Contains(fields) => fields
                .iter()
                .filter_map(|field| record.get_str(field))
                .any(|value| value.contains(key)),
            KeyMatch::Exact(field) => record.get_str(field) == Some(key),
        }
    }
}

impl ResourceKind {
    /// Field holding the identity of a record of this kind.
    pub fn id_field(self) -> &'static str {
        match self {
            ResourceKind::Branch => "name",
            ResourceKind::File => "file_path",
            _ => "id",
        }
    }

    /// Human-meaningful key used by lookups.
    pub fn key_match(self) -> KeyMatch {
        match self {
            ResourceKind::User => KeyMatch::Contains(&["username", "email"]),
            ResourceKind::Group | ResourceKind::Namespace => KeyMatch::Exact("path"),
            ResourceKind::Repository => KeyMatch::Exact("path_with_namespace"),
            ResourceKind::Branch => KeyMatch::Exact("name"),
            ResourceKind::Member => KeyMatch::Exact("username"),
            ResourceKind::File => KeyMatch::Exact("file_path"),
            ResourceKind::Milestone => KeyMatch::Exact("title"),
            ResourceKind::GroupShare => KeyMatch::Exact("group_id"),
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResourceKind::User => "user",
            ResourceKind::Group => "group",
            ResourceKind::Namespace => "namespace",
            ResourceKind::Repository => "repository",
            ResourceKind::Branch => "branch",
            ResourceKind::Member => "member",
            ResourceKind::File => "file",
            ResourceKind::Milestone => "milestone",
            ResourceKind::GroupShare => "group share",
        })
    }
}

/// Permission granted to a member or a shared group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Guest,
    Reporter,
    Developer,
    Master,
}

impl AccessLevel {
    /// Numeric level understood by the remote service.
    pub fn level(self) -> i64 {
        match self {
            AccessLevel::Guest => 10,
            AccessLevel::Reporter => 20,
            AccessLevel::Developer => 30,
            AccessLevel::Master => 40,
        }
    }
}

impl FromStr for AccessLevel {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "guest" => Ok(AccessLevel::Guest),
            "reporter" => Ok(AccessLevel::Reporter),
            "developer" => Ok(AccessLevel::Developer),
            "master" => Ok(AccessLevel::Master),
            _ => Err(ParseError::InvalidAccessLevel(value.to_owned())),
        }
    }
}

impl Display for AccessLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AccessLevel::Guest => "guest",
            AccessLevel::Reporter => "reporter",
            AccessLevel::Developer => "developer",
            AccessLevel::Master => "master",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileEncoding {
    #[default]
    Text,
    Base64,
}

impl FromStr for FileEncoding {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(FileEncoding::Text),
            "base64" => Ok(FileEncoding::Base64),
            _ => Err(ParseError::InvalidEncoding(value.to_owned())),
        }
    }
}

impl Display for FileEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileEncoding::Text => f.write_str("text"),
            FileEncoding::Base64 => f.write_str("base64"),
        }
    }
}

/// Two-valued wire representation of a boolean parameter.
pub fn flag(value: bool) -> FieldValue {
    FieldValue::from(if value { "true" } else { "false" })
}

/// Reads a boolean out of a free-form cell such as `yes`, `private` or `enabled`.
pub fn parse_flag(value: &str) -> Result<bool, ParseError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "public" | "enabled" => Ok(true),
        "false" | "no" | "off" | "0" | "private" | "disabled" => Ok(false),
        _ => Err(ParseError::InvalidFlag(value.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_access_levels() {
        assert_eq!("master".parse::<AccessLevel>(), Ok(AccessLevel::Master));
        assert_eq!("Developer".parse::<AccessLevel>(), Ok(AccessLevel::Developer));
        assert_eq!(AccessLevel::Guest.level(), 10);
        assert_eq!(
            "owner".parse::<AccessLevel>(),
            Err(ParseError::InvalidAccessLevel("owner".to_owned()))
        );
    }

    #[test]
    fn parse_encodings() {
        assert_eq!("base64".parse::<FileEncoding>(), Ok(FileEncoding::Base64));
        assert!("utf8".parse::<FileEncoding>().is_err());
    }

    #[test]
    fn normalize_flags() {
        assert_eq!(parse_flag("Public"), Ok(true));
        assert_eq!(parse_flag(" disabled "), Ok(false));
        assert_eq!(parse_flag("0"), Ok(false));
        assert!(parse_flag("maybe").is_err());
        assert_eq!(flag(true), FieldValue::from("true"));
        assert_eq!(flag(false), FieldValue::from("false"));
    }

    #[test]
    fn users_match_on_username_or_email() {
        let user = Record::new()
            .with("username", "alice")
            .with("email", "wonder@example.com");
        let matcher = ResourceKind::User.key_match();

        assert!(matcher.matches(&user, "ali"));
        assert!(matcher.matches(&user, "wonder@"));
        assert!(!matcher.matches(&user, "bob"));
    }

    #[test]
    fn repositories_match_exact_path() {
        let repo = Record::new().with("path_with_namespace", "group/app");
        let matcher = ResourceKind::Repository.key_match();

        assert!(matcher.matches(&repo, "group/app"));
        assert!(!matcher.matches(&repo, "group"));
    }
}
