use crate::domain::{
    self, ContainerInspect, ContainerRecord, ContainerSpec, CreatedContainer, DaemonInfo,
    EngineClient, ExecInspect, ExecOptions, HistoryRecord, ImageRecord, NetworkSettings,
    RemoveOptions, ServerVersion, StateFlags, StopOptions,
};
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub record: ContainerRecord,
    /// `None` simulates an inspect payload without a `State` section
    pub flags: Option<StateFlags>,
    pub ip: String,
}

#[derive(Debug, Clone)]
struct ExecScript {
    code: Option<i64>,
    output: Vec<u8>,
}

/// In-memory engine. Every call is recorded as `"op"` or `"op:args"` and can
/// be made to fail with [`MockEngine::set_fail_on`].
#[derive(Debug, Default)]
pub struct MockEngine {
    images: RwLock<Vec<ImageRecord>>,
    history: RwLock<HashMap<String, Vec<HistoryRecord>>>,
    containers: RwLock<Vec<MockContainer>>,
    exec_scripts: RwLock<HashMap<String, ExecScript>>,
    exec_sessions: RwLock<HashMap<String, Vec<String>>>,
    exec_codes: RwLock<HashMap<String, Option<i64>>>,
    endpoint: RwLock<Option<String>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
    next_id: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&self, id: &str, tags: &[&str], parent: Option<&str>) {
        self.add_image_record(ImageRecord {
            id: id.to_string(),
            parent_id: parent.unwrap_or_default().to_string(),
            created: 1700000000,
            size: 7340032,
            virtual_size: 7340032,
            labels: HashMap::new(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            names: Vec::new(),
        });
    }

    pub fn add_image_record(&self, record: ImageRecord) {
        self.images.write().unwrap().push(record);
    }

    pub fn set_history(&self, image_id: &str, rows: Vec<HistoryRecord>) {
        self.history
            .write()
            .unwrap()
            .insert(image_id.to_string(), rows);
    }

    pub fn add_container(&self, id: &str, name: &str, image: &str, running: bool) {
        self.add_container_record(ContainerRecord {
            id: id.to_string(),
            names: vec![name.to_string()],
            image: image.to_string(),
            created: 1700000000,
            status: if running { "Up" } else { "Exited (0)" }.to_string(),
            ..ContainerRecord::default()
        });
        self.set_running(id, running);
    }

    pub fn add_container_record(&self, record: ContainerRecord) {
        self.containers.write().unwrap().push(MockContainer {
            record,
            flags: Some(StateFlags::default()),
            ip: String::new(),
        });
    }

    pub fn set_state_flags(&self, id: &str, flags: StateFlags) {
        self.with_container(id, |c| c.flags = Some(flags));
    }

    pub fn drop_state_section(&self, id: &str) {
        self.with_container(id, |c| c.flags = None);
    }

    /// Address reported while the container is running
    pub fn set_ip(&self, id: &str, ip: &str) {
        self.with_container(id, |c| c.ip = ip.to_string());
    }

    /// Exit code and output for every exec whose program is `program`.
    /// Unscripted programs exit 0 with no output.
    pub fn set_exec_result(&self, program: &str, code: i64, output: &str) {
        self.exec_scripts.write().unwrap().insert(
            program.to_string(),
            ExecScript {
                code: Some(code),
                output: output.as_bytes().to_vec(),
            },
        );
    }

    pub fn set_exec_without_exit_code(&self, program: &str) {
        self.exec_scripts.write().unwrap().insert(
            program.to_string(),
            ExecScript {
                code: None,
                output: Vec::new(),
            },
        );
    }

    pub fn set_endpoint(&self, endpoint: Option<&str>) {
        *self.endpoint.write().unwrap() = endpoint.map(str::to_string);
    }

    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    pub fn clear_fail_on(&self) {
        *self.fail_on.write().unwrap() = None;
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    /// Number of recorded calls of `operation`
    pub fn count(&self, operation: &str) -> usize {
        let prefix = format!("{operation}:");
        self.commands
            .read()
            .unwrap()
            .iter()
            .filter(|cmd| cmd.as_str() == operation || cmd.starts_with(&prefix))
            .count()
    }

    pub fn container_exists(&self, id: &str) -> bool {
        self.containers
            .read()
            .unwrap()
            .iter()
            .any(|c| c.record.id == id)
    }

    pub fn is_running(&self, id: &str) -> Option<bool> {
        self.containers
            .read()
            .unwrap()
            .iter()
            .find(|c| c.record.id == id)
            .map(|c| c.flags.as_ref().is_some_and(|f| f.running))
    }

    fn set_running(&self, id: &str, running: bool) {
        self.with_container(id, |c| {
            let flags = c.flags.get_or_insert_with(StateFlags::default);
            flags.running = running;
            flags.status = if running { "running" } else { "exited" }.to_string();
        });
    }

    fn with_container(&self, id: &str, update: impl FnOnce(&mut MockContainer)) -> bool {
        let mut containers = self.containers.write().unwrap();
        match containers.iter_mut().find(|c| c.record.id == id) {
            Some(container) => {
                update(container);
                true
            }
            None => false,
        }
    }

    /// Resolves like the engine does: by id, by tag, by tag plus `:latest`,
    /// and by the short form of a Docker Hub tag.
    fn has_image(&self, reference: &str) -> bool {
        let with_tag = format!("{reference}:latest");
        let matches = |tag: &str| tag == reference || tag == with_tag;

        self.images.read().unwrap().iter().any(|image| {
            image.id == reference
                || image.tags().iter().any(|tag| {
                    matches(tag.as_str()) || domain::hub_short_reference(tag).is_some_and(matches)
                })
        })
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if self.fail_on.read().unwrap().as_deref() == Some(operation) {
            bail!("Mock failure on: {}", operation);
        }
        Ok(())
    }
}

impl EngineClient for MockEngine {
    fn list_images(&self, all: bool) -> Result<Vec<ImageRecord>> {
        self.record_command(if all { "list_images:all" } else { "list_images" });
        self.check_fail("list_images")?;
        Ok(self.images.read().unwrap().clone())
    }

    fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>> {
        self.record_command(if all {
            "list_containers:all"
        } else {
            "list_containers:running"
        });
        self.check_fail("list_containers")?;

        Ok(self
            .containers
            .read()
            .unwrap()
            .iter()
            .filter(|c| all || c.flags.as_ref().is_some_and(|f| f.running))
            .map(|c| c.record.clone())
            .collect())
    }

    fn create_container(&self, image: &str, spec: &ContainerSpec) -> Result<CreatedContainer> {
        self.record_command(&format!("create:{}", image));
        self.check_fail("create")?;

        if !self.has_image(image) {
            bail!("no such image: {}", image);
        }

        let n = self.next_id();
        let id = format!("{:064x}", 0xc0ffee0000_usize + n);
        let name = spec
            .name
            .map(str::to_string)
            .unwrap_or_else(|| format!("mock_{n}"));

        self.add_container_record(ContainerRecord {
            id: id.clone(),
            names: vec![format!("/{name}")],
            image: image.to_string(),
            command: spec.command.join(" "),
            created: 1700000000,
            status: "Created".to_string(),
            ..ContainerRecord::default()
        });

        Ok(CreatedContainer {
            id,
            warnings: Vec::new(),
        })
    }

    fn start_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("start:{}", id));
        self.check_fail("start")?;

        if !self.with_container(id, |_| ()) {
            bail!("no such container: {}", id);
        }
        self.set_running(id, true);
        Ok(())
    }

    fn stop_container(&self, id: &str, options: &StopOptions) -> Result<()> {
        match options.timeout {
            Some(timeout) => self.record_command(&format!("stop:{}:{}", id, timeout)),
            None => self.record_command(&format!("stop:{}", id)),
        }
        self.check_fail("stop")?;

        if !self.with_container(id, |_| ()) {
            bail!("no such container: {}", id);
        }
        self.set_running(id, false);
        Ok(())
    }

    fn remove_container(&self, id: &str, _options: &RemoveOptions) -> Result<()> {
        self.record_command(&format!("remove:{}", id));
        self.check_fail("remove")?;

        let mut containers = self.containers.write().unwrap();
        let before = containers.len();
        containers.retain(|c| c.record.id != id);
        if containers.len() == before {
            bail!("no such container: {}", id);
        }
        Ok(())
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        self.record_command(&format!("inspect:{}", id));
        self.check_fail("inspect")?;

        let containers = self.containers.read().unwrap();
        let Some(container) = containers.iter().find(|c| c.record.id == id) else {
            bail!("no such container: {}", id);
        };

        let running = container.flags.as_ref().is_some_and(|f| f.running);
        Ok(ContainerInspect {
            id: container.record.id.clone(),
            name: container.record.names.first().cloned().unwrap_or_default(),
            image: container.record.image.clone(),
            state: container.flags.clone(),
            network_settings: Some(NetworkSettings {
                ip_address: if running {
                    container.ip.clone()
                } else {
                    String::new()
                },
            }),
        })
    }

    fn exec_create(&self, id: &str, cmd: &[String], _options: &ExecOptions) -> Result<String> {
        self.record_command(&format!("exec_create:{}:{}", id, cmd.join(" ")));
        self.check_fail("exec_create")?;

        if !self.container_exists(id) {
            bail!("no such container: {}", id);
        }

        let exec_id = format!("exec-{}", self.next_id());
        self.exec_sessions
            .write()
            .unwrap()
            .insert(exec_id.clone(), cmd.to_vec());
        Ok(exec_id)
    }

    fn exec_start(&self, exec_id: &str) -> Result<Vec<u8>> {
        self.record_command(&format!("exec_start:{}", exec_id));
        self.check_fail("exec_start")?;

        let Some(argv) = self.exec_sessions.write().unwrap().remove(exec_id) else {
            bail!("no such exec: {}", exec_id);
        };

        let program = argv.first().cloned().unwrap_or_default();
        let script = self
            .exec_scripts
            .read()
            .unwrap()
            .get(&program)
            .cloned()
            .unwrap_or(ExecScript {
                code: Some(0),
                output: Vec::new(),
            });

        self.exec_codes
            .write()
            .unwrap()
            .insert(exec_id.to_string(), script.code);
        Ok(script.output)
    }

    fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect> {
        self.record_command(&format!("exec_inspect:{}", exec_id));
        self.check_fail("exec_inspect")?;

        let Some(code) = self.exec_codes.read().unwrap().get(exec_id).copied() else {
            bail!("no such exec: {}", exec_id);
        };
        Ok(ExecInspect {
            exit_code: code,
            running: false,
        })
    }

    fn image_history(&self, id: &str) -> Result<Vec<HistoryRecord>> {
        self.record_command(&format!("history:{}", id));
        self.check_fail("history")?;
        Ok(self
            .history
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    fn daemon_info(&self) -> Result<DaemonInfo> {
        self.record_command("info");
        self.check_fail("info")?;
        Ok(DaemonInfo {
            driver: Some("overlay".to_string()),
            containers: Some(self.containers.read().unwrap().len() as u64),
            images: Some(self.images.read().unwrap().len() as u64),
            ..DaemonInfo::default()
        })
    }

    fn daemon_version(&self) -> Result<ServerVersion> {
        self.record_command("version");
        self.check_fail("version")?;
        Ok(ServerVersion {
            version: Some("4.9.3".to_string()),
            api_version: Some("4.9.3".to_string()),
            go_version: Some("go1.22.2".to_string()),
            os: Some("linux".to_string()),
            arch: Some("amd64".to_string()),
            ..ServerVersion::default()
        })
    }

    fn pull(&self, reference: &str, tag: &str) -> Result<()> {
        self.record_command(&format!("pull:{}:{}", reference, tag));
        self.check_fail("pull")?;

        let id = format!("{:064x}", 0xfeed0000_usize + self.next_id());
        self.add_image(&id, &[&format!("{reference}:{tag}")], None);
        Ok(())
    }

    fn endpoint(&self) -> Option<String> {
        self.endpoint.read().unwrap().clone()
    }
}
