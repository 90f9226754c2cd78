//! Git author identity used for commits made inside agent containers.

/// A resolved name/email pair. Both fields are non-empty by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl GitIdentity {
    /// Build an identity from layered optional sources, first non-empty wins
    /// per field. Returns `None` unless both a name and an email resolve.
    #[must_use]
    pub fn from_sources<'a, I, J>(names: I, emails: J) -> Option<Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
        J: IntoIterator<Item = Option<&'a str>>,
    {
        let name = first_non_empty(names)?;
        let email = first_non_empty(emails)?;
        Some(Self { name, email })
    }
}

fn first_non_empty<'a, I>(sources: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    sources
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_empty_source_wins() {
        let id = GitIdentity::from_sources(
            [None, Some("  "), Some("Ada Lovelace")],
            [Some("ada@example.com"), Some("ignored@example.com")],
        )
        .unwrap();
        assert_eq!(id.name, "Ada Lovelace");
        assert_eq!(id.email, "ada@example.com");
    }

    #[test]
    fn missing_email_yields_none() {
        assert!(GitIdentity::from_sources([Some("Ada")], [None, Some("")]).is_none());
    }
}
