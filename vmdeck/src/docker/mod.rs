//! Container engine operations, all through the `docker` CLI.
//!
//! Listing commands ask for tab-separated `--format` output in a fixed
//! column order and parse it with [`parse`]. Pulls and builds are started
//! as streaming jobs and handed back as a `JobId`.

pub mod parse;

pub use self::parse::{ContainerRow, ImageRow, SearchResult};

use crate::errors::{Error, Result};
use crate::tools::ToolPaths;
use joblib::{JobId, JobReport, JobSpec, OutputLine, Stream, Supervisor};
use std::path::Path;
use tracing::{debug, info};

const VERSION_FORMAT: &str = "{{.Server.Version}}";
const SEARCH_FORMAT: &str =
    "{{.Name}}\t{{.Description}}\t{{.StarCount}}\t{{.IsOfficial}}\t{{.IsAutomated}}";
const IMAGES_FORMAT: &str = "{{.Repository}}\t{{.Tag}}\t{{.ID}}\t{{.CreatedSince}}\t{{.Size}}";
const CONTAINERS_FORMAT: &str =
    "{{.ID}}\t{{.Names}}\t{{.Status}}\t{{.Image}}\t{{.Ports}}\t{{.CreatedAt}}";

const UNREACHABLE_MARKERS: [&str; 3] = [
    "Cannot connect to the Docker daemon",
    "error during connect",
    "Is the docker daemon running",
];
const NO_SUCH_CONTAINER: &str = "No such container";

#[derive(Clone, Debug)]
pub struct DockerEngine {
    supervisor: Supervisor,
    tools: ToolPaths,
}

impl DockerEngine {
    pub fn new(supervisor: Supervisor, tools: ToolPaths) -> Self {
        Self { supervisor, tools }
    }

    /// Create an engine handle and make sure the daemon answers.
    pub async fn connect(supervisor: Supervisor, tools: ToolPaths) -> Result<Self> {
        let engine = Self::new(supervisor, tools);
        let version = engine.server_version().await?;
        info!(%version, "connected to docker daemon");
        Ok(engine)
    }

    pub async fn server_version(&self) -> Result<String> {
        let report = self
            .query(self.docker().args(["version", "--format", VERSION_FORMAT]))
            .await?;
        Ok(report.text(Stream::Stdout).trim().to_string())
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("search query cannot be empty".into()));
        }
        let report = self
            .query(
                self.docker()
                    .args(["search", "--no-trunc", "--format", SEARCH_FORMAT])
                    .arg(query),
            )
            .await?;
        Ok(parse::parse_search(&report.text(Stream::Stdout)))
    }

    pub async fn pull(&self, image: &str) -> Result<JobId> {
        let image = image.trim();
        if image.is_empty() {
            return Err(Error::Validation("image name cannot be empty".into()));
        }
        self.start(self.docker().arg("pull").arg(image)).await
    }

    /// Build `dockerfile` with its own directory as the build context.
    pub async fn build(&self, dockerfile: &Path, tag: &str) -> Result<JobId> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(Error::Validation("image tag cannot be empty".into()));
        }
        if !dockerfile.is_file() {
            return Err(Error::Validation(format!(
                "Dockerfile {} does not exist",
                dockerfile.display()
            )));
        }
        let context = match dockerfile.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        self.start(
            self.docker()
                .arg("build")
                .arg("-f")
                .arg(dockerfile)
                .arg("-t")
                .arg(tag)
                .arg(context),
        )
        .await
    }

    pub async fn images(&self, filter: Option<&str>) -> Result<Vec<ImageRow>> {
        let mut spec = self.docker().args(["images", "--format", IMAGES_FORMAT]);
        if let Some(term) = filter.map(str::trim).filter(|term| !term.is_empty()) {
            spec = spec.arg("--filter").arg(format!("reference=*{}*", term));
        }
        let report = self.query(spec).await?;
        Ok(parse::parse_images(&report.text(Stream::Stdout)))
    }

    /// Running containers only.
    pub async fn containers(&self) -> Result<Vec<ContainerRow>> {
        let report = self
            .query(self.docker().args([
                "ps",
                "--filter",
                "status=running",
                "--format",
                CONTAINERS_FORMAT,
            ]))
            .await?;
        Ok(parse::parse_containers(&report.text(Stream::Stdout)))
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::Validation("container id cannot be empty".into()));
        }
        match self.query(self.docker().arg("stop").arg(id)).await {
            Ok(_) => {
                info!(container = id, "container stopped");
                Ok(())
            }
            Err(Error::RuntimeFailure { output, .. }) if mentions(&output, NO_SUCH_CONTAINER) => {
                Err(Error::ContainerNotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Stream a pull or build started by this engine to its end.
    pub async fn follow<F>(&self, job_id: JobId, command: &str, on_line: F) -> Result<JobReport>
    where
        F: FnMut(&OutputLine),
    {
        let report = self.supervisor.follow(job_id, on_line).await?;
        crate::check(command, report).map_err(engine_error)
    }

    fn docker(&self) -> JobSpec {
        self.tools.docker()
    }

    async fn start(&self, spec: JobSpec) -> Result<JobId> {
        let command = spec.display();
        let job_id = self.supervisor.start(spec).await?;
        debug!(%job_id, %command, "docker job started");
        Ok(job_id)
    }

    async fn query(&self, spec: JobSpec) -> Result<JobReport> {
        crate::run_checked(&self.supervisor, spec)
            .await
            .map_err(engine_error)
    }
}

fn mentions(output: &[OutputLine], needle: &str) -> bool {
    output.iter().any(|line| line.text().contains(needle))
}

/// Turn a failed docker invocation that never reached the daemon into
/// `ConnectionUnavailable`. Anything else is returned unchanged.
pub fn engine_error(err: Error) -> Error {
    match err {
        Error::RuntimeFailure { ref output, .. }
            if UNREACHABLE_MARKERS
                .iter()
                .any(|marker| mentions(output, marker)) =>
        {
            Error::ConnectionUnavailable(err.diagnostics().unwrap_or_default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_tool;
    use joblib::{JobStatus, SupervisorConfig};
    use std::fs;
    use tempfile::TempDir;

    /// A `docker` stand-in that answers each subcommand with canned rows and
    /// records its arguments, one per line, in `args.log`.
    const FAKE_DOCKER: &str = r#"
dir=$(dirname "$0")
printf '%s\n' "$@" > "$dir/args.log"
case "$1" in
  version) echo "24.0.7" ;;
  search) printf 'nginx\tOfficial build of Nginx.\t20000\t[OK]\t\n' ;;
  images) printf 'python\t3.9-slim\tabc123def456\t2 weeks ago\t125MB\n' ;;
  ps) printf '0123456789ab\tweb\tUp 3 minutes\tnginx:latest\t\t2024-03-01 10:20:30 +0000 UTC\n' ;;
  stop)
    if [ "$2" = "ghost" ]; then
      echo "Error response from daemon: No such container: ghost" >&2
      exit 1
    fi
    echo "$2" ;;
  pull) echo "latest: Pulling from library/$2"; echo "Status: Downloaded newer image for $2" ;;
  build) echo "Step 1/2 : FROM python:3.9-slim"; echo "Successfully tagged $5" ;;
  *) echo "unknown command $1" >&2; exit 2 ;;
esac
"#;

    const DAEMON_DOWN: &str = "echo 'Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?' >&2; exit 1";

    fn engine(body: &str) -> (TempDir, DockerEngine) {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            docker: fake_tool(dir.path(), "docker", body),
            ..ToolPaths::default()
        };
        let supervisor = Supervisor::spawn(SupervisorConfig::default());
        (dir, DockerEngine::new(supervisor, tools))
    }

    fn logged_args(dir: &TempDir) -> Vec<String> {
        fs::read_to_string(dir.path().join("args.log"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn connect_reads_the_server_version() {
        let (dir, engine) = engine(FAKE_DOCKER);
        let engine = DockerEngine::connect(engine.supervisor, engine.tools)
            .await
            .unwrap();
        assert_eq!(engine.server_version().await.unwrap(), "24.0.7");
        assert_eq!(
            logged_args(&dir),
            ["version", "--format", "{{.Server.Version}}"]
        );
    }

    #[tokio::test]
    async fn unreachable_daemon_is_reported_as_such() {
        let (_dir, engine) = engine(DAEMON_DOWN);
        let err = DockerEngine::connect(engine.supervisor.clone(), engine.tools.clone())
            .await
            .unwrap_err();
        match err {
            Error::ConnectionUnavailable(details) => {
                assert!(details.contains("Is the docker daemon running?"))
            }
            other => panic!("expected ConnectionUnavailable, got {:?}", other),
        }
        assert!(matches!(
            engine.containers().await,
            Err(Error::ConnectionUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn search_parses_rows_and_rejects_blank_queries() {
        let (dir, engine) = engine(FAKE_DOCKER);
        let results = engine.search(" nginx ").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].official);
        assert_eq!(results[0].stars, 20000);
        assert_eq!(logged_args(&dir).last().map(String::as_str), Some("nginx"));

        assert!(matches!(engine.search("   ").await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn image_filter_becomes_a_reference_pattern() {
        let (dir, engine) = engine(FAKE_DOCKER);
        let images = engine.images(Some("py")).await.unwrap();
        assert_eq!(images[0].tag, "3.9-slim");
        let args = logged_args(&dir);
        assert_eq!(&args[args.len() - 2..], ["--filter", "reference=*py*"]);

        engine.images(None).await.unwrap();
        assert!(!logged_args(&dir).contains(&"--filter".to_string()));
    }

    #[tokio::test]
    async fn lists_only_running_containers() {
        let (dir, engine) = engine(FAKE_DOCKER);
        let rows = engine.containers().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ports, "None");
        assert_eq!(rows[0].created, "2024-03-01 10:20:30");
        assert_eq!(&logged_args(&dir)[..3], ["ps", "--filter", "status=running"]);
    }

    #[tokio::test]
    async fn stopping_a_vanished_container() {
        let (_dir, engine) = engine(FAKE_DOCKER);
        engine.stop("web").await.unwrap();
        assert!(matches!(
            engine.stop("ghost").await,
            Err(Error::ContainerNotFound(id)) if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn pull_streams_progress() {
        let (_dir, engine) = engine(FAKE_DOCKER);
        let job_id = engine.pull("redis").await.unwrap();
        let mut lines = Vec::new();
        let report = engine
            .follow(job_id, "docker pull redis", |line| {
                lines.push(line.text().into_owned())
            })
            .await
            .unwrap();
        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(
            lines,
            [
                "latest: Pulling from library/redis",
                "Status: Downloaded newer image for redis"
            ]
        );
    }

    #[tokio::test]
    async fn build_uses_the_dockerfile_directory_as_context() {
        let (dir, engine) = engine(FAKE_DOCKER);
        let project = dir.path().join("my app");
        fs::create_dir(&project).unwrap();
        let dockerfile = project.join("Dockerfile");
        fs::write(&dockerfile, "FROM python:3.9-slim\n").unwrap();

        let job_id = engine.build(&dockerfile, "my-app:dev").await.unwrap();
        let report = engine.follow(job_id, "docker build", |_| {}).await.unwrap();
        assert!(report.succeeded());
        assert_eq!(
            logged_args(&dir),
            [
                "build".to_string(),
                "-f".to_string(),
                dockerfile.display().to_string(),
                "-t".to_string(),
                "my-app:dev".to_string(),
                project.display().to_string(),
            ]
        );

        assert!(matches!(
            engine.build(&dockerfile, " ").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            engine.build(&project.join("Missing"), "x").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn failed_pull_keeps_the_engine_message() {
        let (_dir, engine) = engine(
            "echo 'Error response from daemon: pull access denied for nope' >&2; exit 1",
        );
        let job_id = engine.pull("nope").await.unwrap();
        let err = engine.follow(job_id, "docker pull nope", |_| {}).await.unwrap_err();
        assert!(err.diagnostics().unwrap().contains("pull access denied"));
    }
}
