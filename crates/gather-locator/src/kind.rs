use std::fmt;

/// The protocol a locator resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriKind {
    Git,
    Http,
    File,
    Oci,
    Unknown,
}

impl UriKind {
    /// Key under which the gatherer for this kind is registered.
    pub fn scheme(&self) -> Option<&'static str> {
        use UriKind::*;
        match self {
            Git => Some("git"),
            Http => Some("http"),
            File => Some("file"),
            Oci => Some("oci"),
            Unknown => None,
        }
    }
}

impl fmt::Display for UriKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use UriKind::*;
        write!(
            f,
            "{}",
            match self {
                Git => "GitURI",
                Http => "HTTPURI",
                File => "FileURI",
                Oci => "OCIURI",
                Unknown => "Unknown",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(UriKind::Git.to_string(), "GitURI");
        assert_eq!(UriKind::Http.to_string(), "HTTPURI");
        assert_eq!(UriKind::File.to_string(), "FileURI");
        assert_eq!(UriKind::Oci.to_string(), "OCIURI");
        assert_eq!(UriKind::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn schemes() {
        assert_eq!(UriKind::Git.scheme(), Some("git"));
        assert_eq!(UriKind::Http.scheme(), Some("http"));
        assert_eq!(UriKind::Unknown.scheme(), None);
    }
}
