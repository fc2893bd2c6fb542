//! Changelog derivation.
//!
//! Entries are read from `git log` between the previous and the current
//! tag, then filtered, sorted, abbreviated, grouped and rendered as
//! Markdown. A native source (notes generated by the release host) skips
//! every formatting step and is used verbatim.

use async_trait::async_trait;
use regex::Regex;
use shipwright_core::config::{Changelog, ChangelogGroup, ChangelogSource, Filters};
use shipwright_core::git::{self, Vcs};
use shipwright_core::{Context, Error, Outcome, Result, Skipper, Stage};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// File name of the rendered changelog inside the dist directory.
pub const CHANGELOG_FILE: &str = "CHANGELOG.md";

const HEADING: &str = "## Changelog";

/// One log line reduced to its commit id and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Commit id, possibly abbreviated or empty.
    pub id: String,
    /// Commit subject.
    pub message: String,
}

impl Entry {
    /// Splits a `--pretty=oneline` line at the first space.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line.split_once(' ') {
            Some((id, message)) => Self {
                id: id.to_string(),
                message: message.to_string(),
            },
            None => Self {
                id: line.to_string(),
                message: String::new(),
            },
        }
    }

    /// Renders the entry as it appears in a bullet.
    #[must_use]
    pub fn line(&self) -> String {
        if self.id.is_empty() {
            self.message.clone()
        } else {
            format!("{} {}", self.id, self.message)
        }
    }
}

/// Ordering applied to entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    /// Keep log order, newest first.
    Log,
    /// By message, ascending.
    Asc,
    /// By message, descending.
    Desc,
}

impl Sort {
    /// Parses the configured sort value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for anything but `""`, `asc` or `desc`.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "" => Ok(Self::Log),
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(Error::config(
                format!("invalid sort direction \"{other}\""),
                "Use `asc`, `desc` or leave `changelog.sort` empty",
            )),
        }
    }
}

/// A named set of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Heading.
    pub title: String,
    /// Render position.
    pub order: i32,
    /// Claimed entries.
    pub entries: Vec<Entry>,
}

fn compile(pattern: &str, context: impl Into<String>) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::pattern(pattern, Some(context.into()), e))
}

/// Applies include filters, or exclude filters when there is no include.
///
/// # Errors
///
/// Returns an error if a pattern is not a valid regular expression.
pub fn filter(entries: Vec<Entry>, filters: &Filters) -> Result<Vec<Entry>> {
    if !filters.include.is_empty() {
        let include = filters
            .include
            .iter()
            .map(|p| compile(p, "changelog include filter"))
            .collect::<Result<Vec<_>>>()?;
        return Ok(entries
            .into_iter()
            .filter(|e| include.iter().any(|re| re.is_match(&e.message)))
            .collect());
    }
    let exclude = filters
        .exclude
        .iter()
        .map(|p| compile(p, "changelog exclude filter"))
        .collect::<Result<Vec<_>>>()?;
    Ok(entries
        .into_iter()
        .filter(|e| !exclude.iter().any(|re| re.is_match(&e.message)))
        .collect())
}

/// Sorts entries by message.
pub fn sort(entries: &mut [Entry], direction: Sort) {
    match direction {
        Sort::Log => {}
        Sort::Asc => entries.sort_by(|a, b| a.message.cmp(&b.message)),
        Sort::Desc => entries.sort_by(|a, b| b.message.cmp(&a.message)),
    }
}

/// Truncates ids to `abbrev` characters, or removes them when negative.
pub fn abbreviate(entries: &mut [Entry], abbrev: i32) {
    match usize::try_from(abbrev) {
        Ok(0) => {}
        Ok(len) => {
            for entry in entries {
                if let Some((cut, _)) = entry.id.char_indices().nth(len) {
                    entry.id.truncate(cut);
                }
            }
        }
        Err(_) => {
            for entry in entries {
                entry.id.clear();
            }
        }
    }
}

/// Partitions entries with ordered rules. Each rule claims the entries it
/// matches; a rule without a pattern claims everything left. Groups come
/// back sorted by `order`, empty ones included.
///
/// # Errors
///
/// Returns an error if a rule's pattern is invalid.
pub fn group(entries: Vec<Entry>, rules: &[ChangelogGroup]) -> Result<Vec<Group>> {
    let mut remaining = entries;
    let mut groups = Vec::with_capacity(rules.len());
    for rule in rules {
        let claimed = if rule.regexp.is_empty() {
            std::mem::take(&mut remaining)
        } else {
            let re = compile(&rule.regexp, format!("failed to group into \"{}\"", rule.title))?;
            let (claimed, rest): (Vec<_>, Vec<_>) =
                remaining.into_iter().partition(|e| re.is_match(&e.message));
            remaining = rest;
            claimed
        };
        groups.push(Group {
            title: rule.title.clone(),
            order: rule.order,
            entries: claimed,
        });
        if remaining.is_empty() {
            break;
        }
    }
    groups.sort_by_key(|g| g.order);
    Ok(groups)
}

fn bullets(out: &mut String, entries: &[Entry]) {
    for entry in entries {
        let _ = writeln!(out, "* {}", entry.line());
    }
}

/// Renders ungrouped entries.
#[must_use]
pub fn render(entries: &[Entry]) -> String {
    let mut out = format!("{HEADING}\n\n");
    bullets(&mut out, entries);
    out
}

/// Renders groups, skipping empty ones.
#[must_use]
pub fn render_groups(groups: &[Group]) -> String {
    let mut out = format!("{HEADING}\n");
    for group in groups.iter().filter(|g| !g.entries.is_empty()) {
        let _ = writeln!(out, "\n### {}\n", group.title);
        bullets(&mut out, &group.entries);
    }
    out
}

/// Runs filter, sort, abbreviation and grouping over raw entries and
/// renders the result.
///
/// # Errors
///
/// Returns an error for invalid patterns or sort values.
pub fn format_entries(entries: Vec<Entry>, config: &Changelog) -> Result<String> {
    let direction = Sort::parse(&config.sort)?;
    let mut entries = filter(entries, &config.filters)?;
    sort(&mut entries, direction);
    abbreviate(&mut entries, config.abbrev);
    if config.groups.is_empty() {
        return Ok(render(&entries));
    }
    Ok(render_groups(&group(entries, &config.groups)?))
}

/// Lower comparison point of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Previous {
    /// An earlier tag.
    Tag(String),
    /// The repository's root commit, used when there is no earlier tag.
    FirstCommit(String),
}

/// Finds the tag before `tag`, falling back to the first commit.
///
/// # Errors
///
/// Returns an error if neither a previous tag nor a root commit exists.
pub async fn previous(vcs: &dyn Vcs, tag: &str) -> Result<Previous> {
    let parent = format!("{tag}^");
    match vcs.run_clean(&["describe", "--tags", "--abbrev=0", parent.as_str()]).await {
        Ok(prev) if !prev.is_empty() => Ok(Previous::Tag(prev)),
        _ => {
            debug!(tag, "no previous tag, using first commit");
            let first = vcs.run_clean(&["rev-list", "--max-parents=0", "HEAD"]).await?;
            Ok(Previous::FirstCommit(first))
        }
    }
}

/// Reads the one line log between `previous` and `tag`.
///
/// # Errors
///
/// Returns an error if `git log` fails.
pub async fn log(vcs: &dyn Vcs, previous: &Previous, tag: &str) -> Result<Vec<Entry>> {
    let refs = match previous {
        Previous::Tag(prev) => vec![format!("{prev}..{tag}")],
        Previous::FirstCommit(sha) => vec![sha.clone(), tag.to_string()],
    };
    let mut args = vec![
        "log",
        "--pretty=oneline",
        "--abbrev-commit",
        "--no-decorate",
        "--no-color",
    ];
    args.extend(refs.iter().map(String::as_str));
    let output = vcs.run(&args).await?;
    Ok(git::lines(&output).iter().map(|l| Entry::parse(l)).collect())
}

/// Produces release notes from an external source, for example the
/// release host's auto-generated notes.
#[async_trait]
pub trait NotesGenerator: Send + Sync {
    /// Returns the notes between `previous` and `current`, verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the notes cannot be produced.
    async fn generate(&self, previous: &str, current: &str) -> Result<String>;
}

/// Stage writing `CHANGELOG.md` and the release notes.
#[derive(Default, Clone)]
pub struct ChangelogStage {
    native: Option<Arc<dyn NotesGenerator>>,
}

impl std::fmt::Debug for ChangelogStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangelogStage")
            .field("native", &self.native.is_some())
            .finish()
    }
}

impl ChangelogStage {
    /// Creates the stage without a native notes source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `generator` when `changelog.use` is a native source.
    #[must_use]
    pub fn with_native(mut self, generator: Arc<dyn NotesGenerator>) -> Self {
        self.native = Some(generator);
        self
    }

    async fn generate(&self, ctx: &Context) -> Result<String> {
        let tag = ctx.git.current_tag.as_str();
        let prev = if ctx.git.previous_tag.is_empty() {
            previous(ctx.vcs(), tag).await?
        } else {
            Previous::Tag(ctx.git.previous_tag.clone())
        };

        match ctx.config.changelog.source {
            ChangelogSource::GithubNative => {
                let generator = self.native.as_ref().ok_or_else(|| {
                    Error::config(
                        "changelog.use is github-native but no notes generator is configured",
                        "Use `use: git` or register a release host publisher",
                    )
                })?;
                let from = match &prev {
                    Previous::Tag(t) | Previous::FirstCommit(t) => t.as_str(),
                };
                generator.generate(from, tag).await
            }
            ChangelogSource::Git => {
                let entries = log(ctx.vcs(), &prev, tag).await?;
                format_entries(entries, &ctx.config.changelog)
            }
        }
    }
}

impl Skipper for ChangelogStage {
    fn skip(&self, ctx: &Context) -> Result<Option<String>> {
        if ctx.config.changelog.disable {
            return Ok(Some("changelog should not be built".to_string()));
        }
        if ctx.options.snapshot {
            return Ok(Some("not available for snapshots".to_string()));
        }
        if !ctx.release_notes.is_empty() {
            return Ok(Some("release notes were provided".to_string()));
        }
        Ok(None)
    }
}

#[async_trait]
impl Stage for ChangelogStage {
    fn description(&self) -> &str {
        "generating changelog"
    }

    fn skipper(&self) -> Option<&dyn Skipper> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let body = self.generate(ctx).await?;
        let config = &ctx.config.changelog;
        let mut notes = String::new();
        if !config.header.is_empty() {
            let _ = writeln!(notes, "{}\n", config.header.trim_end());
        }
        notes.push_str(&body);
        if !config.footer.is_empty() {
            let _ = write!(notes, "\n{}\n", config.footer.trim_end());
        }

        let dist = ctx.dist();
        tokio::fs::create_dir_all(&dist).await?;
        let path = dist.join(CHANGELOG_FILE);
        tokio::fs::write(&path, &notes).await?;
        info!(path = %path.display(), "changelog written");
        ctx.release_notes = notes;
        Ok(Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(messages: &[&str]) -> Vec<Entry> {
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| Entry {
                id: format!("abcdef{i}"),
                message: (*m).to_string(),
            })
            .collect()
    }

    fn messages(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_parse_splits_at_first_space() {
        let entry = Entry::parse("a1b2c3 feat: add thing here");
        assert_eq!(entry.id, "a1b2c3");
        assert_eq!(entry.message, "feat: add thing here");
        assert_eq!(entry.line(), "a1b2c3 feat: add thing here");
    }

    #[test]
    fn test_empty_filters_are_a_no_op() {
        let input = entries(&["b: x", "docs: y", "a: x"]);
        let out = filter(input.clone(), &Filters::default()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_include_wins_over_exclude() {
        let filters = Filters {
            include: vec!["^feat".to_string()],
            exclude: vec!["feat".to_string()],
        };
        let out = filter(entries(&["feat: a", "fix: b", "feat: c"]), &filters).unwrap();
        assert_eq!(messages(&out), vec!["feat: a", "feat: c"]);
    }

    #[test]
    fn test_exclude_matches_message_only() {
        let filters = Filters {
            exclude: vec!["^docs:".to_string(), "^abcdef".to_string()],
            ..Filters::default()
        };
        let out = filter(entries(&["docs: a", "fix: b"]), &filters).unwrap();
        assert_eq!(messages(&out), vec!["fix: b"]);
    }

    #[test]
    fn test_invalid_filter_names_pattern() {
        let filters = Filters {
            exclude: vec!["(".to_string()],
            ..Filters::default()
        };
        let err = filter(entries(&["a"]), &filters).unwrap_err();
        assert!(err.to_string().contains("\"(\""));
    }

    #[test]
    fn test_sort_directions() {
        let base = entries(&["b: x", "a: x", "c: x"]);

        let mut asc = base.clone();
        sort(&mut asc, Sort::parse("asc").unwrap());
        assert_eq!(messages(&asc), vec!["a: x", "b: x", "c: x"]);

        let mut desc = base.clone();
        sort(&mut desc, Sort::parse("desc").unwrap());
        assert_eq!(messages(&desc), vec!["c: x", "b: x", "a: x"]);

        let mut unset = base.clone();
        sort(&mut unset, Sort::parse("").unwrap());
        assert_eq!(unset, base);

        assert!(Sort::parse("sideways").is_err());
    }

    #[test]
    fn test_abbreviate() {
        let mut e = entries(&["a"]);
        abbreviate(&mut e, 3);
        assert_eq!(e[0].line(), "abc a");

        let mut e = entries(&["a"]);
        abbreviate(&mut e, 0);
        assert_eq!(e[0].id, "abcdef0");

        let mut e = entries(&["a"]);
        abbreviate(&mut e, 40);
        assert_eq!(e[0].id, "abcdef0");

        let mut e = entries(&["a"]);
        abbreviate(&mut e, -1);
        assert_eq!(e[0].line(), "a");
    }

    #[test]
    fn test_group_catch_all_and_order() {
        let rules = vec![
            ChangelogGroup {
                title: "Others".to_string(),
                regexp: String::new(),
                order: 1,
            },
            ChangelogGroup {
                title: "Features".to_string(),
                regexp: "^feat".to_string(),
                order: 0,
            },
        ];
        // The catch-all comes first here, so it claims everything and the
        // loop stops before the feature rule.
        let groups = group(entries(&["feat: a", "fix: b"]), &rules).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].entries.len(), 2);

        let rules = vec![
            ChangelogGroup {
                title: "Features".to_string(),
                regexp: "^feat".to_string(),
                order: 0,
            },
            ChangelogGroup {
                title: "Others".to_string(),
                regexp: String::new(),
                order: 1,
            },
        ];
        let groups = group(entries(&["fix: b", "feat: a", "chore: c", "feat: d"]), &rules).unwrap();
        assert_eq!(groups[0].title, "Features");
        assert_eq!(messages(&groups[0].entries), vec!["feat: a", "feat: d"]);
        assert_eq!(groups[1].title, "Others");
        assert_eq!(messages(&groups[1].entries), vec!["fix: b", "chore: c"]);
    }

    #[test]
    fn test_groups_render_by_order_not_rule_position() {
        let config = Changelog {
            groups: vec![
                ChangelogGroup {
                    title: "Bugs".to_string(),
                    regexp: "^fix".to_string(),
                    order: 2,
                },
                ChangelogGroup {
                    title: "Features".to_string(),
                    regexp: "^feat".to_string(),
                    order: 0,
                },
                ChangelogGroup {
                    title: "Empty".to_string(),
                    regexp: "^perf".to_string(),
                    order: 1,
                },
                ChangelogGroup {
                    title: "Others".to_string(),
                    regexp: String::new(),
                    order: 3,
                },
            ],
            abbrev: -1,
            ..Changelog::default()
        };
        let out = format_entries(entries(&["fix: b", "feat: a", "chore: c"]), &config).unwrap();
        assert_eq!(
            out,
            "## Changelog\n\n### Features\n\n* feat: a\n\n### Bugs\n\n* fix: b\n\n### Others\n\n* chore: c\n"
        );
    }

    #[test]
    fn test_invalid_group_pattern() {
        let rules = vec![ChangelogGroup {
            title: "Broken".to_string(),
            regexp: "[".to_string(),
            order: 0,
        }];
        let err = group(entries(&["a"]), &rules).unwrap_err();
        assert!(err.to_string().contains("failed to group into \"Broken\""));
    }

    #[derive(Debug)]
    struct FixedNotes;

    #[async_trait]
    impl NotesGenerator for FixedNotes {
        async fn generate(&self, previous: &str, current: &str) -> Result<String> {
            Ok(format!("notes {previous}..{current}"))
        }
    }

    fn native_ctx(root: &std::path::Path) -> Context {
        let mut project = shipwright_core::Project::default();
        project.changelog.source = ChangelogSource::GithubNative;
        project.changelog.header = "# Release".to_string();
        let mut ctx = Context::new(project, shipwright_core::RunOptions::default(), root);
        ctx.git.current_tag = "v1.1.0".to_string();
        ctx.git.previous_tag = "v1.0.0".to_string();
        ctx
    }

    #[tokio::test]
    async fn test_native_notes_are_used_verbatim() {
        let root = tempfile::TempDir::new().unwrap();
        let mut ctx = native_ctx(root.path());
        let stage = ChangelogStage::new().with_native(Arc::new(FixedNotes));

        stage.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.release_notes, "# Release\n\nnotes v1.0.0..v1.1.0");
        assert!(!ctx.release_notes.contains(HEADING));
    }

    #[tokio::test]
    async fn test_native_source_needs_a_generator() {
        let root = tempfile::TempDir::new().unwrap();
        let mut ctx = native_ctx(root.path());
        let err = ChangelogStage::new().run(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("no notes generator"));
    }

    #[test]
    fn test_render_plain() {
        let out = render(&entries(&["feat: a", "fix: b"]));
        assert_eq!(out, "## Changelog\n\n* abcdef0 feat: a\n* abcdef1 fix: b\n");
    }
}
