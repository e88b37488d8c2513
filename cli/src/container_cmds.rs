//! The `container-*` command family.

use alloc::format;
use alloc::string::String;
use core::fmt::Write;

use corral_container::{image, ContainerManager, IMAGE_DIR};
use corral_exec::TaskId;
use corral_fs::vfs::{read_to_vec, write_all};
use corral_fs::{path, FileKind, FsError, Vfs};
use corral_isolation::config::WINDOW_TICKS;
use corral_isolation::{CPU_UNLIMITED, MEM_UNLIMITED};

use crate::shell::{fail, usage, CmdResult, Shell, LS_PAGE};

/// Parse the optional `[mem_kb] [cpu_pct]` tail shared by
/// `container-create` and `container-run`. CPU percent arrives
/// pre-scaled by 100 and is converted to window ticks here.
fn parse_limits(args: &[&str]) -> Option<(usize, u32)> {
    let mem = match args.first() {
        None => MEM_UNLIMITED,
        Some(s) => s.parse::<usize>().ok()?.checked_mul(1024)?,
    };
    let quota = match args.get(1) {
        None => CPU_UNLIMITED,
        Some(s) => {
            let pct_x100 = s.parse::<u64>().ok()?;
            let ticks = pct_x100 * WINDOW_TICKS / 10_000;
            ticks.clamp(1, u64::from(u32::MAX - 1)) as u32
        }
    };
    Some((mem, quota))
}

const CREATE_USAGE: &str = "container-create <image> <program> [mem_kb] [cpu_pct]";

fn create_common(
    shell: &Shell,
    args: &[&str],
    out: &mut dyn Write,
) -> Result<u64, crate::shell::CmdError> {
    let (image_name, program, limits) = match args {
        [image, program, rest @ ..] => (*image, *program, rest),
        _ => {
            let _ = writeln!(out, "usage: {}", CREATE_USAGE);
            return Err(crate::shell::CmdError::Usage);
        }
    };
    let Some((mem_limit, cpu_quota)) = parse_limits(limits) else {
        let _ = writeln!(out, "usage: mem_kb and cpu_pct must be unsigned numbers");
        return Err(crate::shell::CmdError::Usage);
    };

    // Containers are named after their image, truncated to the name cap.
    let name = &image_name[..image_name.len().min(corral_exec::MAX_NAME)];
    match shell.mgr.create(name, image_name, program, mem_limit, cpu_quota) {
        Ok(id) => Ok(id),
        Err(e) => {
            let _ = writeln!(out, "error: {}", e);
            Err(crate::shell::CmdError::Failed)
        }
    }
}

pub(crate) fn create(shell: &Shell, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let id = create_common(shell, args, out)?;
    let _ = writeln!(out, "container {} created", id);
    Ok(())
}

/// `container-run`: create + start.
pub(crate) fn run(shell: &Shell, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let id = create_common(shell, args, out)?;
    match shell.mgr.start(id) {
        Ok(()) => {
            let _ = writeln!(out, "container {} running", id);
            Ok(())
        }
        Err(e) => fail(out, e),
    }
}

pub(crate) fn ls(shell: &Shell, _args: &[&str], out: &mut dyn Write) -> CmdResult {
    let infos = shell.mgr.list();
    let _ = writeln!(out, "{:<5} {:<16} {:<8} {:>10} {:>8}", "ID", "NAME", "STATE", "MEM", "CPU");
    for (row, info) in infos.iter().enumerate() {
        if row > 0 && row % LS_PAGE == 0 {
            let _ = writeln!(out, "-- more --");
        }
        let mem = if info.mem_limit == MEM_UNLIMITED {
            String::from("-")
        } else {
            format!("{}", info.mem_limit)
        };
        let cpu = if info.cpu_quota == CPU_UNLIMITED {
            String::from("-")
        } else {
            format!("{}", info.cpu_quota)
        };
        let _ = writeln!(
            out,
            "{:<5} {:<16} {:<8} {:>10} {:>8}",
            info.id,
            info.name.as_str(),
            info.state,
            mem,
            cpu
        );
    }
    let _ = writeln!(out, "{} container(s)", infos.len());
    Ok(())
}

fn parse_id(args: &[&str], out: &mut dyn Write, cmd: &str) -> Result<u64, crate::shell::CmdError> {
    match args.first().and_then(|s| s.parse::<u64>().ok()) {
        Some(id) => Ok(id),
        None => {
            let _ = writeln!(out, "usage: {}", cmd);
            Err(crate::shell::CmdError::Usage)
        }
    }
}

pub(crate) fn start(shell: &Shell, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let id = parse_id(args, out, "container-start <id>")?;
    match shell.mgr.start(id) {
        Ok(()) => {
            let _ = writeln!(out, "container {} running", id);
            Ok(())
        }
        Err(e) => fail(out, e),
    }
}

pub(crate) fn stop(shell: &Shell, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let id = parse_id(args, out, "container-stop <id>")?;
    match shell.mgr.stop(id) {
        Ok(()) => {
            let _ = writeln!(out, "container {} stopped", id);
            Ok(())
        }
        Err(e) => fail(out, e),
    }
}

pub(crate) fn delete(shell: &Shell, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let id = parse_id(args, out, "container-delete <id>")?;
    match shell.mgr.delete(id) {
        Ok(()) => {
            let _ = writeln!(out, "container {} deleted", id);
            Ok(())
        }
        Err(e) => fail(out, e),
    }
}

/// `container-load <path>`: copy an image file into the canonical store
/// under its basename. The source is read through the caller's view.
pub(crate) fn load(shell: &Shell, task: TaskId, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let Some(&src) = args.first() else {
        return usage(out, "container-load <path>");
    };
    let name = path::basename(src);
    if name.is_empty() {
        return usage(out, "container-load <path>");
    }

    let real_src = match shell.taskfs.resolve(task, src) {
        Ok(p) => p,
        Err(e) => return fail(out, e),
    };
    let vfs = shell.taskfs.vfs().as_ref();
    let bytes = match read_to_vec(vfs, &real_src) {
        Ok(b) => b,
        Err(e) => return fail(out, e),
    };
    if let Err(e) = image::ensure_image_store(vfs) {
        return fail(out, e);
    }
    let dest = format!("{}/{}", IMAGE_DIR, name);
    match write_all(vfs, &dest, &bytes) {
        Ok(()) => {
            let _ = writeln!(out, "loaded {} ({} bytes)", name, bytes.len());
            Ok(())
        }
        Err(e) => fail(out, e),
    }
}

/// `container-save <id> <path>`: pack the container's working directory
/// into an image at a caller-visible path.
pub(crate) fn save(shell: &Shell, task: TaskId, args: &[&str], out: &mut dyn Write) -> CmdResult {
    let id = parse_id(args, out, "container-save <id> <path>")?;
    let Some(&dest) = args.get(1) else {
        return usage(out, "container-save <id> <path>");
    };
    if shell.mgr.get(id).is_err() {
        return fail(out, "no such container");
    }
    let real_dest = match shell.taskfs.resolve(task, dest) {
        Ok(p) => p,
        Err(e) => return fail(out, e),
    };
    let src_dir = ContainerManager::root_dir_for(id);
    match image::pack(shell.taskfs.vfs().as_ref(), &src_dir, &real_dest) {
        Ok(()) => {
            let _ = writeln!(out, "saved container {} to {}", id, dest);
            Ok(())
        }
        Err(e) => fail(out, e),
    }
}

/// `container-image`: list the canonical image store.
pub(crate) fn images(shell: &Shell, _args: &[&str], out: &mut dyn Write) -> CmdResult {
    let vfs = shell.taskfs.vfs().as_ref();
    let entries = match vfs.read_dir(IMAGE_DIR) {
        Ok(entries) => entries,
        Err(FsError::NotFound) => {
            let _ = writeln!(out, "no images");
            return Ok(());
        }
        Err(e) => return fail(out, e),
    };
    let mut count = 0usize;
    for entry in entries.iter().filter(|e| e.kind == FileKind::File) {
        let _ = writeln!(out, "{:<32} {:>10}", entry.name, entry.size);
        count += 1;
    }
    let _ = writeln!(out, "{} image(s)", count);
    Ok(())
}
