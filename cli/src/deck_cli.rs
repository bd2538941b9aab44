use crate::arg_parser::{DiskCommand, DockerCommand, DockerfileCommand, SubCommand, VmCommand};
use crate::shutdown::cancel_on_signal;
use joblib::{JobId, OutputLine, Stream};
use vmdeck::disk::DiskRequest;
use vmdeck::docker::DockerEngine;
use vmdeck::vm::VmRequest;
use vmdeck::{dockerfile, Deck, Error, Result};

pub struct DeckCli {
    deck: Deck,
}

impl DeckCli {
    pub fn new(deck: Deck) -> Self {
        Self { deck }
    }

    pub async fn run(&self, command: SubCommand) -> Result<()> {
        match command {
            SubCommand::Disk(DiskCommand::Create {
                path,
                size,
                unit,
                format,
                allocation,
            }) => {
                let request = DiskRequest {
                    path,
                    size,
                    unit: unit.into(),
                    format: format.into(),
                    allocation: allocation.into(),
                };
                self.create_disk(&request).await
            }
            SubCommand::Vm(VmCommand::Launch {
                cpus,
                memory,
                disk,
                format,
                iso,
                display,
                machine,
            }) => {
                let request = VmRequest {
                    cpus,
                    memory_mb: memory,
                    disk,
                    disk_format: format.map(Into::into),
                    iso,
                    display,
                    machine,
                };
                self.launch_vm(&request).await
            }
            SubCommand::Docker(command) => self.docker(command).await,
            SubCommand::Dockerfile(DockerfileCommand::New { dir, from, force }) => {
                let content = match from {
                    Some(source) => tokio::fs::read_to_string(&source).await?,
                    None => dockerfile::TEMPLATE.to_string(),
                };
                let path = dockerfile::save(&dir, &content, force).await?;
                println!("Dockerfile saved at: {}", path.display());
                Ok(())
            }
        }
    }

    async fn create_disk(&self, request: &DiskRequest) -> Result<()> {
        let created = self.deck.create_disk(request).await?;
        println!("Command: {}", created.command);
        if !created.output.is_empty() {
            println!("{}", created.output);
        }
        println!("Disk created at: {}", request.path.display());
        Ok(())
    }

    async fn launch_vm(&self, request: &VmRequest) -> Result<()> {
        let job_id = self.deck.launch_vm(request).await?;
        println!("Started VM job id: {}", job_id);
        match self.stream(job_id, "virtual machine").await {
            Ok(()) => println!("VM exited"),
            Err(Error::Cancelled(_)) => println!("VM stopped"),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn docker(&self, command: DockerCommand) -> Result<()> {
        let engine =
            DockerEngine::connect(self.deck.supervisor.clone(), self.deck.tools.clone()).await?;
        match command {
            DockerCommand::Search { query } => {
                for result in engine.search(&query).await? {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        result.name,
                        result.stars,
                        yes_no(result.official),
                        yes_no(result.automated),
                        result.description
                    );
                }
            }
            DockerCommand::Pull { image } => {
                let job_id = engine.pull(&image).await?;
                self.follow_engine_job(&engine, job_id, &format!("docker pull {}", image))
                    .await?;
                println!("Successfully pulled {}", image);
            }
            DockerCommand::Build { dockerfile, tag } => {
                let job_id = engine.build(&dockerfile, &tag).await?;
                self.follow_engine_job(&engine, job_id, &format!("docker build {}", tag))
                    .await?;
                println!("Successfully built {}", tag);
            }
            DockerCommand::Images { filter } => {
                for image in engine.images(filter.as_deref()).await? {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        image.repository, image.tag, image.id, image.created, image.size
                    );
                }
            }
            DockerCommand::Ps => {
                let containers = engine.containers().await?;
                for c in &containers {
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        c.id, c.name, c.status, c.image, c.ports, c.created
                    );
                }
                println!("Found {} running containers", containers.len());
            }
            DockerCommand::Stop { id } => {
                engine.stop(&id).await?;
                println!("Stopped container {}", id);
            }
        }
        Ok(())
    }

    /// Print a job's output until it ends; SIGINT/SIGTERM cancel it.
    async fn stream(&self, job_id: JobId, label: &str) -> Result<()> {
        let watcher = cancel_on_signal(self.deck.supervisor.clone(), job_id);
        let result = self.deck.follow(job_id, label, print_line).await;
        watcher.abort();
        result.map(|_| ())
    }

    async fn follow_engine_job(
        &self,
        engine: &DockerEngine,
        job_id: JobId,
        label: &str,
    ) -> Result<()> {
        let watcher = cancel_on_signal(self.deck.supervisor.clone(), job_id);
        let result = engine.follow(job_id, label, print_line).await;
        watcher.abort();
        result.map(|_| ())
    }
}

fn print_line(line: &OutputLine) {
    match line.stream {
        Stream::Stdout => println!("OUT: {}", line.text()),
        Stream::Stderr => println!("ERR: {}", line.text()),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}
