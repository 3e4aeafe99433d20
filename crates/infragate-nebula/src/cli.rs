//! OpenNebula CLI wrapper
//!
//! Wraps the `onevm`, `onevnet`, `oneimage`, `onetemplate` and `onecluster`
//! commands. Every call spawns one child process; nothing is shared between
//! calls.

use crate::error::{NebulaError, Result};
use crate::record::{ClusterRecord, ImageRecord, TemplateRecord, VmRecord, VnetRecord};
use async_trait::async_trait;
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use tempfile::NamedTempFile;
use tokio::process::Command;

static CREATED_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ID:\s*(\d+)").unwrap());

/// VM power operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Resume,
    Poweroff,
    Reboot,
    Suspend,
}

impl PowerAction {
    pub fn verb(&self) -> &'static str {
        match self {
            PowerAction::Resume => "resume",
            PowerAction::Poweroff => "poweroff",
            PowerAction::Reboot => "reboot",
            PowerAction::Suspend => "suspend",
        }
    }
}

/// VM creation parameters for `onetemplate instantiate`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstantiateRequest {
    pub template_id: String,
    pub name: Option<String>,
    pub cpu: Option<f64>,
    pub vcpu: Option<u32>,
    pub memory_mb: Option<u64>,
}

/// Image creation parameters for `oneimage create`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub name: String,
    pub size_mb: u64,
    pub datastore: String,
    pub description: Option<String>,
}

/// Operations the adapters need from OpenNebula
#[async_trait]
pub trait NebulaApi: Send + Sync {
    async fn vm_list(&self) -> Result<Vec<VmRecord>>;
    async fn vm_show(&self, id: &str) -> Result<VmRecord>;
    async fn vm_instantiate(&self, request: &InstantiateRequest) -> Result<String>;
    async fn vm_terminate(&self, id: &str) -> Result<()>;
    async fn vm_power(&self, id: &str, action: PowerAction, hard: bool) -> Result<()>;
    async fn nic_attach(&self, vm_id: &str, network_id: &str) -> Result<()>;
    async fn nic_detach(&self, vm_id: &str, nic_id: &str) -> Result<()>;
    async fn disk_attach(&self, vm_id: &str, image_id: &str) -> Result<()>;
    async fn disk_detach(&self, vm_id: &str, disk_id: &str) -> Result<()>;

    async fn vnet_list(&self) -> Result<Vec<VnetRecord>>;
    async fn vnet_show(&self, id: &str) -> Result<VnetRecord>;
    /// Creates a network from a rendered template, returns its ID
    async fn vnet_create(&self, template: &str) -> Result<String>;
    async fn vnet_delete(&self, id: &str) -> Result<()>;

    async fn image_list(&self) -> Result<Vec<ImageRecord>>;
    async fn image_show(&self, id: &str) -> Result<ImageRecord>;
    async fn image_create(&self, request: &ImageRequest) -> Result<String>;
    async fn image_delete(&self, id: &str) -> Result<()>;

    async fn template_list(&self) -> Result<Vec<TemplateRecord>>;
    async fn cluster_list(&self) -> Result<Vec<ClusterRecord>>;
}

/// Connection settings shared by every command
#[derive(Debug, Clone, Default)]
pub struct OneCli {
    bin_dir: Option<PathBuf>,
    endpoint: Option<String>,
    user: Option<String>,
    /// `user:password` file the tools read through `ONE_AUTH`
    auth_file: Option<Arc<NamedTempFile>>,
}

impl OneCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(bin_dir.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// A password never goes on the command line; it is written to a
    /// private auth file instead
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let user = user.into();
        match password {
            Some(password) => {
                let mut file = tempfile::Builder::new()
                    .prefix("infragate-one-auth-")
                    .tempfile()?;
                writeln!(file, "{}:{}", user, password)?;
                file.flush()?;
                self.auth_file = Some(Arc::new(file));
                self.user = None;
            }
            None => {
                self.user = Some(user);
                self.auth_file = None;
            }
        }
        Ok(self)
    }

    fn program(&self, tool: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        }
    }

    fn command(&self, tool: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(self.program(tool));
        cmd.args(args);
        if let Some(endpoint) = &self.endpoint {
            cmd.arg("--endpoint").arg(endpoint);
        }
        if let Some(user) = &self.user {
            cmd.arg("--user").arg(user);
        }
        if let Some(auth) = &self.auth_file {
            cmd.env("ONE_AUTH", auth.path());
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Run a CLI command and return stdout
    async fn run_command(&self, tool: &str, args: &[&str]) -> Result<String> {
        let mut cmd = self.command(tool, args);

        tracing::debug!("Running: {} {}", tool, args.join(" "));

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NebulaError::CliNotFound(tool.to_string())
            } else {
                NebulaError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(failure(tool, args, stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run_json(&self, tool: &str, args: &[&str]) -> Result<serde_json::Value> {
        let mut args = args.to_vec();
        args.push("-j");
        let output = self.run_command(tool, &args).await?;
        if output.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&output)?)
    }

    async fn run_create(&self, tool: &str, args: &[&str]) -> Result<String> {
        let output = self.run_command(tool, args).await?;
        created_id(&output)
    }
}

/// Classifies a failed command by its stderr
fn failure(tool: &str, args: &[&str], stderr: String) -> NebulaError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("error getting")
        || lowered.contains("not found")
        || lowered.contains("does not exist")
    {
        return NebulaError::NotFound(stderr);
    }
    NebulaError::CommandFailed {
        command: format!("{} {}", tool, args.first().copied().unwrap_or_default()),
        stderr,
    }
}

/// Extracts the new object ID from `ID: 42` style output
pub fn created_id(output: &str) -> Result<String> {
    CREATED_ID_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| NebulaError::UnexpectedOutput(output.trim().to_string()))
}

#[async_trait]
impl NebulaApi for OneCli {
    async fn vm_list(&self) -> Result<Vec<VmRecord>> {
        let document = self.run_json("onevm", &["list", "--extended"]).await?;
        Ok(VmRecord::pool(&document))
    }

    async fn vm_show(&self, id: &str) -> Result<VmRecord> {
        let document = self.run_json("onevm", &["show", id]).await?;
        Ok(VmRecord::from_document(document))
    }

    async fn vm_instantiate(&self, request: &InstantiateRequest) -> Result<String> {
        let cpu = request.cpu.map(|c| c.to_string());
        let vcpu = request.vcpu.map(|c| c.to_string());
        let memory = request.memory_mb.map(|m| m.to_string());

        let mut args = vec!["instantiate", request.template_id.as_str()];
        if let Some(name) = &request.name {
            args.push("--name");
            args.push(name.as_str());
        }
        if let Some(cpu) = &cpu {
            args.push("--cpu");
            args.push(cpu.as_str());
        }
        if let Some(vcpu) = &vcpu {
            args.push("--vcpu");
            args.push(vcpu.as_str());
        }
        if let Some(memory) = &memory {
            args.push("--memory");
            args.push(memory.as_str());
        }

        self.run_create("onetemplate", &args).await
    }

    async fn vm_terminate(&self, id: &str) -> Result<()> {
        self.run_command("onevm", &["terminate", id]).await?;
        Ok(())
    }

    async fn vm_power(&self, id: &str, action: PowerAction, hard: bool) -> Result<()> {
        let mut args = vec![action.verb(), id];
        if hard && matches!(action, PowerAction::Poweroff | PowerAction::Reboot) {
            args.push("--hard");
        }
        self.run_command("onevm", &args).await?;
        Ok(())
    }

    async fn nic_attach(&self, vm_id: &str, network_id: &str) -> Result<()> {
        self.run_command("onevm", &["nic-attach", vm_id, "--network", network_id])
            .await?;
        Ok(())
    }

    async fn nic_detach(&self, vm_id: &str, nic_id: &str) -> Result<()> {
        self.run_command("onevm", &["nic-detach", vm_id, nic_id])
            .await?;
        Ok(())
    }

    async fn disk_attach(&self, vm_id: &str, image_id: &str) -> Result<()> {
        self.run_command("onevm", &["disk-attach", vm_id, "--image", image_id])
            .await?;
        Ok(())
    }

    async fn disk_detach(&self, vm_id: &str, disk_id: &str) -> Result<()> {
        self.run_command("onevm", &["disk-detach", vm_id, disk_id])
            .await?;
        Ok(())
    }

    async fn vnet_list(&self) -> Result<Vec<VnetRecord>> {
        let document = self.run_json("onevnet", &["list"]).await?;
        Ok(VnetRecord::pool(&document))
    }

    async fn vnet_show(&self, id: &str) -> Result<VnetRecord> {
        let document = self.run_json("onevnet", &["show", id]).await?;
        Ok(VnetRecord::from_document(document))
    }

    async fn vnet_create(&self, template: &str) -> Result<String> {
        // onevnet only reads templates from files
        let file = tempfile::Builder::new()
            .prefix("infragate-vnet-")
            .suffix(".tpl")
            .tempfile()?;
        tokio::fs::write(file.path(), template).await?;

        let path = file.path().to_string_lossy().to_string();
        self.run_create("onevnet", &["create", path.as_str()]).await
    }

    async fn vnet_delete(&self, id: &str) -> Result<()> {
        self.run_command("onevnet", &["delete", id]).await?;
        Ok(())
    }

    async fn image_list(&self) -> Result<Vec<ImageRecord>> {
        let document = self.run_json("oneimage", &["list"]).await?;
        Ok(ImageRecord::pool(&document))
    }

    async fn image_show(&self, id: &str) -> Result<ImageRecord> {
        let document = self.run_json("oneimage", &["show", id]).await?;
        Ok(ImageRecord::from_document(document))
    }

    async fn image_create(&self, request: &ImageRequest) -> Result<String> {
        let size = request.size_mb.to_string();
        let mut args = vec![
            "create",
            "--name",
            request.name.as_str(),
            "--type",
            "DATABLOCK",
            "--size",
            size.as_str(),
            "--datastore",
            request.datastore.as_str(),
        ];
        if let Some(description) = &request.description {
            args.push("--description");
            args.push(description.as_str());
        }
        self.run_create("oneimage", &args).await
    }

    async fn image_delete(&self, id: &str) -> Result<()> {
        self.run_command("oneimage", &["delete", id]).await?;
        Ok(())
    }

    async fn template_list(&self) -> Result<Vec<TemplateRecord>> {
        let document = self.run_json("onetemplate", &["list"]).await?;
        Ok(TemplateRecord::pool(&document))
    }

    async fn cluster_list(&self) -> Result<Vec<ClusterRecord>> {
        let document = self.run_json("onecluster", &["list"]).await?;
        Ok(ClusterRecord::pool(&document))
    }
}
