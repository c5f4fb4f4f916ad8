use std::env::args;
use std::process::exit;

use ferrophorus::Project;

fn main() {
    pretty_env_logger::init();
    let Some(path) = args().nth(1) else {
        eprintln!("usage: ferrophorus <project.sb3>");
        exit(1);
    };
    let mut project = match Project::load(&path) {
        Ok(project) => project,
        Err(error) => {
            eprintln!("{error}");
            exit(1);
        }
    };
    project.run();
}
