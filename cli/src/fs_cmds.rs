//! Filesystem-facing commands: `run`, `ls`, `pwd`.

use alloc::vec::Vec;
use core::fmt::Write;

use corral_container::ProgramLoader;
use corral_exec::TaskId;
use corral_fs::{FileKind, OpenOptions};

use crate::shell::{fail, usage, CmdResult, Shell};

/// `run <elf-path>`: load a file through the calling task's view and
/// execute it in the current task context.
pub(crate) fn run(shell: &Shell, task: TaskId, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let Some(&path) = args.first() else {
        return usage(out, "run <elf-path>");
    };
    let bytes = match read_via_task(shell, task, path) {
        Ok(b) => b,
        Err(e) => return fail(out, e),
    };
    match shell.loader.exec(&bytes, task) {
        Ok(()) => {
            let _ = writeln!(out, "{}: exited", path);
            Ok(())
        }
        Err(e) => fail(out, e),
    }
}

/// `ls [path]`: directory listing, defaulting to "/".
pub(crate) fn ls(shell: &Shell, task: TaskId, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let path = args.first().copied().unwrap_or("/");
    let entries = match shell.taskfs.read_dir(task, path) {
        Ok(entries) => entries,
        Err(e) => return fail(out, e),
    };
    for entry in &entries {
        match entry.kind {
            FileKind::Dir => {
                let _ = writeln!(out, "{}/", entry.name);
            }
            FileKind::File => {
                let _ = writeln!(out, "{:<24} {:>10}", entry.name, entry.size);
            }
        }
    }
    Ok(())
}

/// `pwd`: the calling task's effective working directory.
pub(crate) fn pwd(shell: &Shell, task: TaskId, _args: &[&str], out: &mut dyn Write) -> CmdResult {
    let _ = writeln!(out, "{}", shell.taskfs.cwd(task));
    Ok(())
}

fn read_via_task(shell: &Shell, task: TaskId, path: &str) -> Result<Vec<u8>, corral_fs::FsError> {
    let handle = shell.taskfs.open(task, path, OpenOptions::read_only())?;
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    let result = loop {
        match shell.taskfs.read(handle, &mut chunk) {
            Ok(0) => break Ok(()),
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) => break Err(e),
        }
    };
    shell.taskfs.close(handle)?;
    result.map(|()| out)
}
