// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Filesystem module loader for the command line driver.
//!
//! Module `a.b.c` is looked up as `a/b/c.marl` under each search directory
//! in order. A few modules are compiled into the binary and answered as
//! foreign modules without touching the filesystem.

use std::path::{Path, PathBuf};

use marl_vm::{Configuration, ForeignFunction, LoadContext, LoadModuleResult, ModuleLoader, Value, Vm};
use tracing::{debug, trace};

/// Source file extension
pub const SOURCE_EXTENSION: &str = "marl";

/// Modules built into the driver.
const STATIC_MODULES: &[(&str, ForeignFunction)] = &[("sys", sys_entry)];

/// Core variable holding the search path reported by `sys.path`
pub const SEARCH_PATH_VARIABLE: &str = "__path__";

/// Resolves modules from a list of directories.
#[derive(Debug, Clone)]
pub struct FsLoader {
    search_path: Vec<PathBuf>,
}

impl FsLoader {
    /// Create a loader searching `search_path` in order
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Finds the first file for `name` on the search path.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = module_file(name)?;
        self.search_path
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|candidate| candidate.is_file())
    }

    /// Search directories joined with `:`
    pub fn joined_search_path(&self) -> String {
        self.search_path
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Installs this loader into a new VM and records the search path as
    /// a core variable of that VM.
    pub fn into_vm(self, config: Configuration) -> Vm {
        let path = self.joined_search_path();
        let mut vm = Vm::new(config.with_loader(self));
        vm.define_core_variable(SEARCH_PATH_VARIABLE, Value::from(path));
        vm
    }
}

impl ModuleLoader for FsLoader {
    fn load_module(&mut self, name: &str, _cx: &mut LoadContext<'_>) -> LoadModuleResult {
        if let Some(&(_, entry)) = STATIC_MODULES.iter().find(|(static_name, _)| *static_name == name) {
            debug!("Module {} is built in", name);
            return LoadModuleResult::Foreign {
                handle: None,
                entry,
                path: None,
            };
        }

        let Some(file) = self.resolve(name) else {
            trace!("Module {} not on search path {:?}", name, self.search_path);
            return LoadModuleResult::NotFound;
        };

        debug!("Loading module {} from {}", name, file.display());
        match std::fs::read_to_string(&file) {
            Ok(text) => LoadModuleResult::source_at(text, file.display().to_string()),
            Err(error) => LoadModuleResult::OwnedError(format!("{}: {}", file.display(), error)),
        }
    }
}

/// Maps a dotted module name to a relative file path.
///
/// Returns `None` for names with empty segments.
pub fn module_file(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for segment in name.split('.') {
        if segment.is_empty() || segment.contains(['/', '\\']) {
            return None;
        }
        path.push(segment);
    }
    path.set_extension(SOURCE_EXTENSION);
    Some(path)
}

/// Builds the search path from `-I` directories, `MARL_PATH` and the
/// current directory, in that order.
pub fn search_path(include: &[PathBuf], env_path: Option<&std::ffi::OsStr>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = include.to_vec();
    if let Some(env_path) = env_path {
        dirs.extend(std::env::split_paths(env_path).filter(|dir| !dir.as_os_str().is_empty()));
    }
    let current = Path::new(".").to_path_buf();
    if !dirs.contains(&current) {
        dirs.push(current);
    }
    dirs
}

fn sys_entry(vm: &mut Vm, args: &[Value]) -> marl_vm::Result<Value> {
    let module = args.first().cloned().unwrap_or_default();
    let core = vm.core_module();
    let path = vm
        .module_variable(&core, SEARCH_PATH_VARIABLE)
        .unwrap_or_else(|_| Value::from(""));

    vm.define_module_variable(&module, "version", Value::from(marl_vm::VERSION))?;
    vm.define_module_variable(&module, "platform", Value::from(std::env::consts::OS))?;
    vm.define_module_variable(&module, "path", path)?;
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marl_vm::RunState;
    use std::fs;

    fn vm_over(dirs: &[&Path]) -> Vm {
        FsLoader::new(dirs.iter().map(|dir| dir.to_path_buf()).collect()).into_vm(Configuration::new())
    }

    #[test]
    fn test_module_file() {
        assert_eq!(module_file("geo"), Some(PathBuf::from("geo.marl")));
        assert_eq!(module_file("a.b.c"), Some(PathBuf::from("a/b/c.marl")));
        assert_eq!(module_file("a..c"), None);
        assert_eq!(module_file(""), None);
        assert_eq!(module_file("../etc"), None);
    }

    #[test]
    fn test_search_path_order() {
        let include = vec![PathBuf::from("lib")];
        let dirs = search_path(&include, Some(std::ffi::OsStr::new("/opt/marl")));
        assert_eq!(
            dirs,
            vec![PathBuf::from("lib"), PathBuf::from("/opt/marl"), PathBuf::from(".")]
        );
        assert_eq!(search_path(&[], None), vec![PathBuf::from(".")]);
    }

    #[test]
    fn test_first_directory_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("geo.marl"), "let origin = \"first\"").unwrap();
        fs::write(second.path().join("geo.marl"), "let origin = \"second\"").unwrap();

        let mut vm = vm_over(&[first.path(), second.path()]);
        let module = vm.import("geo").unwrap();
        assert_eq!(vm.module_variable(&module, "origin").unwrap(), Value::from("first"));

        let expected = format!("<module \"geo\" at \"{}\">", first.path().join("geo.marl").display());
        assert_eq!(vm.stringify(&module), expected);
    }

    #[test]
    fn test_dotted_names_map_to_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("geo")).unwrap();
        fs::write(dir.path().join("geo/shapes.marl"), "let sides = 4").unwrap();

        let mut vm = vm_over(&[dir.path()]);
        let result = vm
            .interpret("main", "import geo.shapes\nshapes.get(\"sides\")")
            .unwrap();
        assert_eq!(result, Value::Int(4));
    }

    #[test]
    fn test_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = vm_over(&[dir.path()]);
        let error = vm.import("nowhere").unwrap_err();
        assert_eq!(error.to_string(), "ImportError: Module not found");
    }

    #[test]
    fn test_unreadable_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("binary.marl"), [0xff, 0xfe, 0x00]).unwrap();

        let mut vm = vm_over(&[dir.path()]);
        let error = vm.import("binary").unwrap_err();
        assert_eq!(error.kind(), "ImportError");
        assert!(error.message().contains("binary.marl"));
    }

    #[test]
    fn test_sys_module() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = vm_over(&[dir.path()]);

        let sys = vm.import("sys").unwrap();
        assert_eq!(vm.module_state(&sys).unwrap(), RunState::Initialized);
        assert_eq!(vm.module_variable(&sys, "version").unwrap(), Value::from(marl_vm::VERSION));
        assert_eq!(
            vm.module_variable(&sys, "platform").unwrap(),
            Value::from(std::env::consts::OS)
        );
        assert_eq!(
            vm.module_variable(&sys, "path").unwrap(),
            Value::from(dir.path().display().to_string())
        );
        assert_eq!(vm.stringify(&sys), "<module \"sys\">");
    }

    #[test]
    fn test_sys_path_is_per_vm() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let mut one = vm_over(&[first.path()]);
        let mut two = vm_over(&[first.path(), second.path()]);

        let sys_two = two.import("sys").unwrap();
        let sys_one = one.import("sys").unwrap();

        assert_eq!(
            one.module_variable(&sys_one, "path").unwrap(),
            Value::from(first.path().display().to_string())
        );
        assert_eq!(
            two.module_variable(&sys_two, "path").unwrap(),
            Value::from(format!("{}:{}", first.path().display(), second.path().display()))
        );
    }

    #[test]
    fn test_sys_path_without_search_path_variable() {
        let mut vm = Vm::new(Configuration::new().with_loader(FsLoader::new(Vec::new())));
        let sys = vm.import("sys").unwrap();
        assert_eq!(vm.module_variable(&sys, "path").unwrap(), Value::from(""));
    }
}
