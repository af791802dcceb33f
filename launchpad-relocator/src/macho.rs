//! Mach-O load-command enumeration and rewriting.
//!
//! Enumeration is pure Rust via `goblin`; rewriting shells out to
//! `install_name_tool`/`codesign` since neither ships as a library and
//! hand-rolling Mach-O mutation is out of scope.

use crate::RelocationError;
use fs_err as fs;
use goblin::mach::load_command::CommandVariant;
use goblin::mach::Mach;
use std::path::Path;
use std::process::{Command, Stdio};

/// The load-command data relevant to relocation: the dylib paths this file
/// references (`LC_LOAD_DYLIB`), its own install name if it has one
/// (`LC_ID_DYLIB`), and its rpath search entries (`LC_RPATH`).
#[derive(Debug, Clone, Default)]
pub struct MachOInfo {
    pub dependencies: Vec<String>,
    pub install_name: Option<String>,
    pub rpaths: Vec<String>,
}

/// Cheap magic-number sniff; avoids paying for a full parse on every file
/// under `bin/`/`lib/`.
pub fn is_macho_file(path: &Path) -> Result<bool, RelocationError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(RelocationError::Io(err)),
    };
    if bytes.len() < 4 {
        return Ok(false);
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Ok(matches!(
        magic,
        0xfeedface | 0xcefaedfe | 0xfeedfacf | 0xcffaedfe | 0xcafebabe | 0xbebafeca
    ))
}

pub fn parse_macho(path: &Path) -> Result<MachOInfo, RelocationError> {
    let bytes = fs::read(path)?;
    let mach = Mach::parse(&bytes).map_err(|err| RelocationError::InvalidMachO(err.to_string()))?;

    let mut info = MachOInfo::default();
    match mach {
        Mach::Binary(macho) => collect(&bytes, &macho, &mut info),
        Mach::Fat(fat) => {
            for index in 0..fat.narches {
                if let Ok(goblin::mach::SingleArch::MachO(macho)) = fat.get(index) {
                    collect(&bytes, &macho, &mut info);
                }
            }
        }
    }
    Ok(info)
}

/// Reads the NUL-terminated string embedded in a load command at
/// `load_command_offset + field_offset`, mirroring how `goblin` itself
/// resolves `LcStr` offsets during parsing.
fn lcstr_at(bytes: &[u8], load_command_offset: usize, field_offset: u32) -> Option<String> {
    let start = load_command_offset + field_offset as usize;
    let slice = bytes.get(start..)?;
    let end = slice.iter().position(|&byte| byte == 0).unwrap_or(slice.len());
    std::str::from_utf8(&slice[..end]).ok().map(|s| s.to_string())
}

fn collect(bytes: &[u8], macho: &goblin::mach::MachO, info: &mut MachOInfo) {
    for load_command in &macho.load_commands {
        match &load_command.command {
            CommandVariant::LoadDylib(dylib)
            | CommandVariant::LoadWeakDylib(dylib)
            | CommandVariant::ReexportDylib(dylib) => {
                if let Some(name) = lcstr_at(bytes, load_command.offset, dylib.dylib.name) {
                    info.dependencies.push(name);
                }
            }
            CommandVariant::IdDylib(dylib) => {
                if let Some(name) = lcstr_at(bytes, load_command.offset, dylib.dylib.name) {
                    info.install_name = Some(name);
                }
            }
            CommandVariant::Rpath(rpath) => {
                if let Some(path) = lcstr_at(bytes, load_command.offset, rpath.path) {
                    info.rpaths.push(path);
                }
            }
            _ => {}
        }
    }
}

/// True when `reference` needs rewriting: it is `@rpath`-relative or an
/// absolute path outside the system dylib prefixes.
pub fn needs_relocation(reference: &str) -> bool {
    const SYSTEM_PREFIXES: &[&str] = &["/usr/lib/", "/System/Library/", "/Library/Apple/"];
    if reference.starts_with("@rpath/") {
        return true;
    }
    reference.starts_with('/') && !SYSTEM_PREFIXES.iter().any(|p| reference.starts_with(p))
}

fn run_tool(tool: &str, args: &[&str]) -> Result<(), RelocationError> {
    let output = Command::new(tool)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|err| RelocationError::SubprocessSpawn(tool.to_string(), err))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    // install_name_tool exits non-zero for "rpath already exists", which we
    // tolerate per the relocator's add-rpath contract.
    if stderr.contains("would duplicate path") {
        return Ok(());
    }
    Err(RelocationError::SubprocessFailed(
        tool.to_string(),
        stderr.trim().to_string(),
    ))
}

pub fn change_install_name(file: &Path, old: &str, new: &str) -> Result<(), RelocationError> {
    run_tool(
        "install_name_tool",
        &["-change", old, new, &file.to_string_lossy()],
    )
}

pub fn change_install_id(file: &Path, new_id: &str) -> Result<(), RelocationError> {
    run_tool("install_name_tool", &["-id", new_id, &file.to_string_lossy()])
}

pub fn add_rpath(file: &Path, rpath: &str) -> Result<(), RelocationError> {
    run_tool("install_name_tool", &["-add_rpath", rpath, &file.to_string_lossy()])
}

pub fn delete_rpath(file: &Path, rpath: &str) -> Result<(), RelocationError> {
    run_tool(
        "install_name_tool",
        &["-delete_rpath", rpath, &file.to_string_lossy()],
    )
}

/// Ad-hoc re-sign; required after any `install_name_tool` rewrite or macOS
/// refuses to load the binary.
pub fn codesign_adhoc(file: &Path) -> Result<(), RelocationError> {
    run_tool("codesign", &["--force", "--sign", "-", &file.to_string_lossy()])
}
