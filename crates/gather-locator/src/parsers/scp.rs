use nom::bytes::complete::{tag, take_till1};
use nom::combinator::{all_consuming, opt, rest, verify};
use nom::error::{context, VerboseError};
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;

/// An scp-style git location, such as `git@github.com:org/repo.git`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScpLocation<'a> {
    pub(crate) user: Option<&'a str>,
    pub(crate) host: &'a str,
    pub(crate) path: &'a str,
}

impl<'a> ScpLocation<'a> {
    /// Renders the location as the equivalent `ssh://` URL.
    pub(crate) fn to_ssh_url(&self) -> String {
        let mut url = String::from("ssh://");
        if let Some(user) = self.user {
            url.push_str(user);
            url.push('@');
        }
        url.push_str(self.host);
        url.push('/');
        url.push_str(self.path.trim_start_matches('/'));
        url
    }
}

/// `scp-location := [ user '@' ] host ':' path`
pub(crate) fn scp_location(input: &str) -> IResult<&str, ScpLocation<'_>, VerboseError<&str>> {
    context(
        "scp-style location",
        all_consuming(tuple((
            opt(terminated(take_till1(|c| c == '@' || c == ':' || c == '/'), tag("@"))),
            verify(take_till1(|c| c == ':' || c == '/' || c == '@'), |host: &str| {
                // A single letter followed by ':' is a Windows drive, not a host.
                host.len() > 1
            }),
            preceded(
                tag(":"),
                verify(rest, |path: &str| !path.is_empty() && !path.starts_with("//")),
            ),
        ))),
    )(input)
    .map(|(input, (user, host, path))| (input, ScpLocation { user, host, path }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn user_host_path() {
        let (_, loc) = scp_location("git@github.com:org/repo.git").unwrap();
        assert_eq!(
            loc,
            ScpLocation {
                user: Some("git"),
                host: "github.com",
                path: "org/repo.git",
            }
        );
        assert_eq!(loc.to_ssh_url(), "ssh://git@github.com/org/repo.git");
    }

    #[test]
    fn no_user() {
        let (_, loc) = scp_location("example.com:/srv/repo").unwrap();
        assert_eq!(loc.user, None);
        assert_eq!(loc.to_ssh_url(), "ssh://example.com/srv/repo");
    }

    #[test]
    fn rejects_non_scp() {
        assert!(scp_location("https://example.com/org/repo").is_err());
        assert!(scp_location("C:\\repos\\repo.git").is_err());
        assert!(scp_location("org/repo").is_err());
        assert!(scp_location("host:").is_err());
    }
}
