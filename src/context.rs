/// Identity of the pull request the current page belongs to.
///
/// Derived once from the page address and immutable afterwards; a navigation
/// that changes the address discards it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    pub organization: String,
    pub project: String,
    pub repository: String,
    pub pull_request_id: u64,
    /// True when the address used the `{org}.visualstudio.com` host shape.
    pub legacy_host: bool,
}

impl RepoContext {
    /// Parse a page address into a repository context.
    ///
    /// Exactly two address shapes are recognized:
    /// - `https://dev.azure.com/{org}/{project}/_git/{repo}/pullrequest/{id}`
    /// - `https://{org}.visualstudio.com/{project}/_git/{repo}/pullrequest/{id}`
    ///
    /// Anything else yields `None`; the remote-content strategy is then
    /// silently skipped and the extraction chain falls through.
    pub fn from_url(url: &str) -> Option<Self> {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))?;
        let (host, path) = rest.split_once('/')?;
        let segments: Vec<&str> = path
            .split('?')
            .next()
            .unwrap_or(path)
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if host.eq_ignore_ascii_case("dev.azure.com") {
            // org / project / _git / repo / pullrequest / id
            let [org, project, git, repo, pr, id] = segments[..] else {
                return None;
            };
            if !git.eq_ignore_ascii_case("_git") || !pr.eq_ignore_ascii_case("pullrequest") {
                return None;
            }
            return Some(Self {
                organization: org.to_string(),
                project: project.to_string(),
                repository: repo.to_string(),
                pull_request_id: id.parse().ok()?,
                legacy_host: false,
            });
        }

        if let Some(org) = host
            .strip_suffix(".visualstudio.com")
            .filter(|o| !o.is_empty() && !o.contains('.'))
        {
            // project / _git / repo / pullrequest / id
            let [project, git, repo, pr, id] = segments[..] else {
                return None;
            };
            if !git.eq_ignore_ascii_case("_git") || !pr.eq_ignore_ascii_case("pullrequest") {
                return None;
            }
            return Some(Self {
                organization: org.to_string(),
                project: project.to_string(),
                repository: repo.to_string(),
                pull_request_id: id.parse().ok()?,
                legacy_host: true,
            });
        }

        None
    }

    /// REST base address for this context's host shape.
    pub fn api_base(&self) -> String {
        if self.legacy_host {
            format!(
                "https://{}.visualstudio.com/{}/_apis/git/repositories/{}",
                self.organization, self.project, self.repository
            )
        } else {
            format!(
                "https://dev.azure.com/{}/{}/_apis/git/repositories/{}",
                self.organization, self.project, self.repository
            )
        }
    }
}
