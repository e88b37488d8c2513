//! End-to-end container lifecycle against the hosted executive and the
//! memory fs.

use std::sync::{Arc, Mutex};
use std::vec::Vec;

use corral_container::{
    ContainerError, ContainerManager, ContainerState, LoadError, ProgramLoader, IMAGE_DIR,
    MAX_CONTAINERS,
};
use corral_exec::hosted::HostedExecutive;
use corral_exec::{Executive, TaskId};
use corral_fs::vfs::write_all;
use corral_fs::{FsError, MemFs, TaskFs, Vfs};
use corral_isolation::IsolationHooks;

struct Rig {
    exec: Arc<HostedExecutive>,
    fs: Arc<MemFs>,
    taskfs: Arc<TaskFs>,
    hooks: IsolationHooks,
    mgr: Arc<ContainerManager>,
}

fn rig_with_loader(loader: Arc<dyn ProgramLoader>) -> Rig {
    let exec = Arc::new(HostedExecutive::new());
    let fs = Arc::new(MemFs::new());
    let taskfs = Arc::new(TaskFs::new(fs.clone()));
    let hooks = IsolationHooks::new(exec.clone());
    let mgr = ContainerManager::new(exec.clone(), taskfs.clone(), hooks.clone(), loader);
    Rig {
        exec,
        fs,
        taskfs,
        hooks,
        mgr,
    }
}

fn rig() -> Rig {
    rig_with_loader(Arc::new(corral_container::NullLoader))
}

/// Encode a flat image in the on-media format.
fn make_image(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut img = vec![files.len() as u8];
    for (name, data) in files {
        img.extend_from_slice(&(data.len() as u64).to_le_bytes());
        let mut field = [0u8; 256];
        field[..name.len()].copy_from_slice(name.as_bytes());
        img.extend_from_slice(&field);
        img.extend_from_slice(data);
    }
    img
}

fn install_image(rig: &Rig, name: &str, files: &[(&str, &[u8])]) {
    for dir in ["/var", "/var/container", IMAGE_DIR] {
        let _ = rig.fs.mkdir(dir);
    }
    let path = format!("{}/{}", IMAGE_DIR, name);
    write_all(rig.fs.as_ref(), &path, &make_image(files)).unwrap();
}

/// Loader that records what it was asked to run, and where the task's
/// root pointed at exec time.
struct RecordingLoader {
    taskfs: Arc<TaskFs>,
    calls: Mutex<Vec<(TaskId, Vec<u8>, String)>>,
}

impl ProgramLoader for RecordingLoader {
    fn exec(&self, image: &[u8], task: TaskId) -> Result<(), LoadError> {
        let root = self.taskfs.root(task);
        self.calls.lock().unwrap().push((task, image.to_vec(), root));
        Ok(())
    }
}

struct FailingLoader;

impl ProgramLoader for FailingLoader {
    fn exec(&self, _image: &[u8], _task: TaskId) -> Result<(), LoadError> {
        Err(LoadError::BadImage)
    }
}

#[test]
fn create_builds_isolation_and_unpacks() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"\x7fELF-ish"), ("conf", b"k=v")]);

    let id = rig.mgr.create("app", "app.img", "app.elf", 64 * 1024, 300).unwrap();

    assert_eq!(rig.hooks.cgroups.active_count(), 1);
    assert_eq!(rig.hooks.pidns.active_count(), 2); // root + container
    assert_eq!(rig.hooks.ipcns.active_count(), 2);

    let workdir = format!("/var/container/{}", id);
    assert!(rig.fs.stat(&workdir).unwrap().is_dir());
    assert_eq!(
        corral_fs::vfs::read_to_vec(rig.fs.as_ref(), &format!("{}/conf", workdir)).unwrap(),
        b"k=v"
    );

    let info = rig.mgr.get(id).unwrap();
    assert_eq!(info.state, ContainerState::Stopped);
    assert_eq!(info.task, None);
    assert_eq!(info.mem_limit, 64 * 1024);
    assert_eq!(info.cpu_quota, 300);
}

#[test]
fn failed_create_rolls_back_everything() {
    let rig = rig();
    install_image(&rig, "ok.img", &[("app.elf", b"x")]);

    // Missing image: the unpack step fails after all three controllers
    // succeeded; everything must unwind.
    let err = rig.mgr.create("ghost", "missing.img", "app.elf", 0, 100);
    assert_eq!(err, Err(ContainerError::Fs(FsError::NotFound)));

    assert_eq!(rig.mgr.count(), 0);
    assert_eq!(rig.hooks.cgroups.active_count(), 0);
    assert_eq!(rig.hooks.pidns.active_count(), 1);
    assert_eq!(rig.hooks.ipcns.active_count(), 1);

    // Ids are consumed by failed creates, never reused.
    let id = rig.mgr.create("app", "ok.img", "app.elf", 0, 100).unwrap();
    assert_eq!(id, 2);
}

#[test]
fn create_fails_if_workdir_already_exists() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);

    // The directory the *next* id would use is already populated.
    rig.fs.mkdir("/var/container/1").unwrap();
    assert_eq!(
        rig.mgr.create("app", "app.img", "app.elf", 0, 100),
        Err(ContainerError::AlreadyExists)
    );
    assert_eq!(rig.hooks.cgroups.active_count(), 0);
}

#[test]
fn start_gates_wrapper_and_invokes_loader_in_chroot() {
    let exec = Arc::new(HostedExecutive::new());
    let fs = Arc::new(MemFs::new());
    let taskfs = Arc::new(TaskFs::new(fs.clone()));
    let hooks = IsolationHooks::new(exec.clone());
    let loader = Arc::new(RecordingLoader {
        taskfs: taskfs.clone(),
        calls: Mutex::new(Vec::new()),
    });
    let mgr = ContainerManager::new(exec.clone(), taskfs.clone(), hooks.clone(), loader.clone());
    let rig = Rig {
        exec,
        fs,
        taskfs,
        hooks,
        mgr,
    };
    install_image(&rig, "app.img", &[("app.elf", b"program-bytes")]);

    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();
    rig.mgr.start(id).unwrap();

    let info = rig.mgr.get(id).unwrap();
    assert_eq!(info.state, ContainerState::Running);
    let task = info.task.expect("running container has a task");
    assert!(rig.exec.is_alive(task));
    // The manager joined the task to the cgroup before releasing it.
    assert!(rig.hooks.cgroups.group_of(task).is_some());
    assert_eq!(rig.hooks.pidns.vpid_of(task), 1);

    // Drive the wrapper to completion.
    assert_eq!(rig.exec.run_ready(), 1);
    let calls = loader.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (loader_task, bytes, root) = &calls[0];
    assert_eq!(*loader_task, task);
    assert_eq!(bytes.as_slice(), b"program-bytes");
    assert_eq!(root, &format!("/var/container/{}", id));

    // The program returned; reconciliation observes the exit.
    rig.mgr.reconcile();
    assert_eq!(rig.mgr.get(id).unwrap().state, ContainerState::Stopped);
    assert_eq!(rig.mgr.get(id).unwrap().task, None);
}

#[test]
fn wrapper_self_terminates_when_isolation_was_tampered_with() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();
    rig.mgr.start(id).unwrap();

    // Sabotage the cgroup membership before the wrapper runs.
    let task = rig.mgr.get(id).unwrap().task.unwrap();
    let cgroup = rig.hooks.cgroups.group_of(task).unwrap();
    rig.hooks.cgroups.remove_task(cgroup, task).unwrap();

    rig.exec.run_ready();
    assert_eq!(rig.mgr.get(id).unwrap().state, ContainerState::Error);
    // Verification failed before the chroot: the task view was never
    // narrowed.
    assert_eq!(rig.taskfs.root(task), "/");
}

#[test]
fn loader_failure_marks_error_and_container_is_deletable() {
    let rig = rig_with_loader(Arc::new(FailingLoader));
    install_image(&rig, "app.img", &[("app.elf", b"bad")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();
    rig.mgr.start(id).unwrap();
    rig.exec.run_ready();

    assert_eq!(rig.mgr.get(id).unwrap().state, ContainerState::Error);
    rig.mgr.delete(id).unwrap();
    assert_eq!(rig.mgr.count(), 0);
}

#[test]
fn stop_is_an_error_on_a_stopped_container() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();

    assert_eq!(rig.mgr.stop(id), Err(ContainerError::InvalidState));

    rig.mgr.start(id).unwrap();
    let task = rig.mgr.get(id).unwrap().task.unwrap();
    rig.mgr.stop(id).unwrap();

    assert_eq!(rig.mgr.get(id).unwrap().state, ContainerState::Stopped);
    assert!(!rig.exec.is_alive(task));
    // The delete hooks cleared the isolation bindings.
    assert_eq!(rig.hooks.cgroups.group_of(task), None);
    assert_eq!(rig.hooks.pidns.vpid_of(task), 0);

    assert_eq!(rig.mgr.stop(id), Err(ContainerError::InvalidState));
}

#[test]
fn pause_and_resume() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();
    rig.mgr.start(id).unwrap();

    rig.mgr.pause(id).unwrap();
    assert_eq!(rig.mgr.get(id).unwrap().state, ContainerState::Paused);
    // A paused wrapper does not run.
    assert_eq!(rig.exec.run_ready(), 0);

    assert_eq!(rig.mgr.pause(id), Err(ContainerError::InvalidState));
    rig.mgr.resume(id).unwrap();
    assert_eq!(rig.mgr.get(id).unwrap().state, ContainerState::Running);
    assert_eq!(rig.exec.run_ready(), 1);
}

#[test]
fn delete_removes_workdir_and_spares_the_image_store() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();
    let workdir = format!("/var/container/{}", id);
    assert!(rig.fs.stat(&workdir).is_ok());

    rig.mgr.delete(id).unwrap();

    assert_eq!(rig.fs.stat(&workdir), Err(FsError::NotFound));
    assert!(rig.fs.stat(&format!("{}/app.img", IMAGE_DIR)).is_ok());
    assert_eq!(rig.hooks.cgroups.active_count(), 0);
    assert_eq!(rig.hooks.pidns.active_count(), 1);
    assert_eq!(rig.hooks.ipcns.active_count(), 1);
    assert_eq!(rig.mgr.delete(id), Err(ContainerError::NotFound));
}

#[test]
fn delete_stops_a_running_container_first() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();
    rig.mgr.start(id).unwrap();
    let task = rig.mgr.get(id).unwrap().task.unwrap();

    rig.mgr.delete(id).unwrap();
    assert!(!rig.exec.is_alive(task));
    assert_eq!(rig.mgr.count(), 0);
}

#[test]
fn unknown_ids_fail_without_side_effects() {
    let rig = rig();
    assert_eq!(rig.mgr.start(99), Err(ContainerError::NotFound));
    assert_eq!(rig.mgr.stop(99), Err(ContainerError::NotFound));
    assert_eq!(rig.mgr.delete(99), Err(ContainerError::NotFound));
    assert_eq!(rig.mgr.get(99).err(), Some(ContainerError::NotFound));
    assert_eq!(rig.mgr.count(), 0);
}

#[test]
fn double_start_is_rejected() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();
    rig.mgr.start(id).unwrap();
    assert_eq!(rig.mgr.start(id), Err(ContainerError::InvalidState));
}

#[test]
fn container_table_capacity() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    for _ in 0..MAX_CONTAINERS {
        rig.mgr.create("app", "app.img", "app.elf", 0, 100).unwrap();
    }
    assert_eq!(
        rig.mgr.create("app", "app.img", "app.elf", 0, 100),
        Err(ContainerError::Capacity)
    );
}

#[test]
fn lookup_by_name_is_exact() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    rig.mgr.create("web", "app.img", "app.elf", 0, 100).unwrap();
    rig.mgr.create("web2", "app.img", "app.elf", 0, 100).unwrap();

    assert_eq!(rig.mgr.get_by_name("web").unwrap().name.as_str(), "web");
    assert_eq!(rig.mgr.get_by_name("web2").unwrap().name.as_str(), "web2");
    assert_eq!(
        rig.mgr.get_by_name("we").err(),
        Some(ContainerError::NotFound)
    );
}

#[test]
fn stats_surface_the_cgroup() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 4096, 250).unwrap();

    let stats = rig.mgr.stats(id).unwrap();
    assert_eq!(stats.mem_limit, 4096);
    assert_eq!(stats.cpu_quota, 250);
    assert_eq!(stats.task_count, 0);

    rig.mgr.start(id).unwrap();
    assert_eq!(rig.mgr.stats(id).unwrap().task_count, 1);
}

#[test]
fn running_container_ticks_against_its_quota() {
    let rig = rig();
    install_image(&rig, "app.img", &[("app.elf", b"x")]);
    let id = rig.mgr.create("app", "app.img", "app.elf", 0, 300).unwrap();
    rig.mgr.start(id).unwrap();
    let task = rig.mgr.get(id).unwrap().task.unwrap();

    // Simulate the scheduler: run the container task whenever admission
    // allows, for just under one window.
    for _ in 0..999u32 {
        rig.exec.advance(1);
        let current = if rig.hooks.can_run(task) { task } else { TaskId::NULL };
        rig.hooks.cgroups.tick(rig.exec.now(), current);
    }
    let stats = rig.mgr.stats(id).unwrap();
    assert!(stats.ticks_used <= 300);
    assert!(stats.ticks_used >= 270);
    assert!(!rig.hooks.can_run(task));
}
