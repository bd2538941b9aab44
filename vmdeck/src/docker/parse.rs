//! Row parsers for the tab-separated `--format` output of the docker CLI.

use tracing::warn;

pub const DESCRIPTION_LIMIT: usize = 100;
pub const CREATED_LIMIT: usize = 19;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    pub name: String,
    pub description: String,
    pub stars: u64,
    pub official: bool,
    pub automated: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRow {
    pub repository: String,
    pub tag: String,
    pub id: String,
    pub created: String,
    pub size: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerRow {
    pub id: String,
    pub name: String,
    pub status: String,
    pub image: String,
    pub ports: String,
    pub created: String,
}

/// Split a row into exactly `N` columns. Rows with any other shape are
/// logged and skipped.
fn columns<const N: usize>(line: &str) -> Option<[&str; N]> {
    let fields: Vec<&str> = line.split('\t').collect();
    match <[&str; N]>::try_from(fields) {
        Ok(fields) => Some(fields),
        Err(fields) => {
            warn!(expected = N, found = fields.len(), line, "skipping malformed docker row");
            None
        }
    }
}

fn rows<'a>(text: &'a str) -> impl Iterator<Item = &'a str> {
    text.lines().filter(|line| !line.trim().is_empty())
}

/// Cut at a character boundary and mark the cut.
pub fn truncate_description(description: &str) -> String {
    let description = description.trim();
    match description.char_indices().nth(DESCRIPTION_LIMIT) {
        Some((cut, _)) => format!("{}...", &description[..cut]),
        None => description.to_string(),
    }
}

/// Docker renders these as `[OK]`/empty, newer releases as `true`/`false`.
fn flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "[ok]" | "true" | "yes"
    )
}

pub fn parse_search(text: &str) -> Vec<SearchResult> {
    rows(text)
        .filter_map(columns::<5>)
        .map(|[name, description, stars, official, automated]| SearchResult {
            name: name.trim().to_string(),
            description: truncate_description(description),
            stars: stars.trim().parse().unwrap_or(0),
            official: flag(official),
            automated: flag(automated),
        })
        .collect()
}

pub fn parse_images(text: &str) -> Vec<ImageRow> {
    rows(text)
        .filter_map(columns::<5>)
        .map(|[repository, tag, id, created, size]| ImageRow {
            repository: repository.trim().to_string(),
            tag: tag.trim().to_string(),
            id: id.trim().to_string(),
            created: created.trim().to_string(),
            size: size.trim().to_string(),
        })
        .collect()
}

pub fn parse_containers(text: &str) -> Vec<ContainerRow> {
    rows(text)
        .filter_map(columns::<6>)
        .map(|[id, name, status, image, ports, created]| {
            let ports = ports.trim();
            ContainerRow {
                id: id.trim().to_string(),
                name: name.trim().to_string(),
                status: status.trim().to_string(),
                image: image.trim().to_string(),
                ports: if ports.is_empty() {
                    "None".to_string()
                } else {
                    ports.to_string()
                },
                created: created.trim().chars().take(CREATED_LIMIT).collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_descriptions_are_cut() {
        let long = "x".repeat(150);
        let cut = truncate_description(&long);
        assert_eq!(cut.len(), DESCRIPTION_LIMIT + 3);
        assert!(cut.ends_with("..."));

        let exact = "y".repeat(DESCRIPTION_LIMIT);
        assert_eq!(truncate_description(&exact), exact);
        assert_eq!(truncate_description(""), "");
    }

    #[test]
    fn cutting_respects_multibyte_characters() {
        let long = "é".repeat(120);
        let cut = truncate_description(&long);
        assert_eq!(cut.chars().count(), DESCRIPTION_LIMIT + 3);
    }

    #[test]
    fn search_rows() {
        let text = "nginx\tOfficial build of Nginx.\t20000\t[OK]\t\n\
                    bitnami/nginx\tBitnami nginx\t180\t\ttrue\n\
                    \n";
        let results = parse_search(text);
        assert_eq!(
            results,
            vec![
                SearchResult {
                    name: "nginx".into(),
                    description: "Official build of Nginx.".into(),
                    stars: 20000,
                    official: true,
                    automated: false,
                },
                SearchResult {
                    name: "bitnami/nginx".into(),
                    description: "Bitnami nginx".into(),
                    stars: 180,
                    official: false,
                    automated: true,
                },
            ]
        );
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let text = "only\ttwo\nredis\t\t5\t[OK]\t\n";
        let results = parse_search(text);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "redis");
        assert_eq!(results[0].description, "");
    }

    #[test]
    fn image_rows() {
        let text = "python\t3.9-slim\tabc123def456\t2 weeks ago\t125MB\n";
        assert_eq!(
            parse_images(text),
            vec![ImageRow {
                repository: "python".into(),
                tag: "3.9-slim".into(),
                id: "abc123def456".into(),
                created: "2 weeks ago".into(),
                size: "125MB".into(),
            }]
        );
    }

    #[test]
    fn container_rows() {
        let text = "0123456789ab\tweb\tUp 3 minutes\tnginx:latest\t0.0.0.0:8080->80/tcp\t2024-03-01 10:20:30 +0000 UTC\n\
                    ba9876543210\tworker\tUp 1 hour\tpython:3.9\t\t2024-02-28 08:00:00 +0000 UTC\n";
        let rows = parse_containers(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ports, "0.0.0.0:8080->80/tcp");
        assert_eq!(rows[0].created, "2024-03-01 10:20:30");
        assert_eq!(rows[1].name, "worker");
        assert_eq!(rows[1].ports, "None");
    }
}
