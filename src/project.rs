use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;
use thiserror::Error;
use zip::ZipArchive;

use crate::blocks;
use crate::engine::Engine;
use crate::json::{self, JsonProject};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open project: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("invalid project.json: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A loaded project: an engine populated with the project's targets and
/// broadcasts, sections registered, ids resolved and every hat compiled.
#[derive(Debug)]
pub struct Project {
    engine: Engine,
}

impl Project {
    /// Loads a zipped `.sb3` bundle, or a bare `project.json` when the path
    /// ends in `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Project, LoadError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let json: JsonProject = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_reader(BufReader::new(file))?
        } else {
            let mut archive = ZipArchive::new(file)?;
            let entry = archive.by_name("project.json")?;
            serde_json::from_reader(BufReader::new(entry))?
        };
        Ok(Project::from_json(json))
    }

    pub fn from_json(json: JsonProject) -> Project {
        let (targets, broadcasts) = json::build_project(json);
        let mut engine = Engine::new();
        blocks::register_default_sections(&mut engine);
        engine.set_targets(targets);
        engine.set_broadcasts(broadcasts);
        engine.resolve_ids();
        engine.compile();
        info!(
            "loaded project: {} targets, {} scripts",
            engine.targets().len(),
            engine.scripts().len()
        );
        Project { engine }
    }

    /// Runs the project until every script has finished.
    pub fn run(&mut self) {
        self.engine.run();
    }

    pub fn start(&mut self) {
        self.engine.start();
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}
