use clap::{App, Arg};

pub struct Args {
    pub root: Option<String>,
    pub stage: Option<String>,
    pub verbose: bool,
}

impl Args {
    pub fn parse() -> Self {
        let matches = App::new("matic")
            .version("0.1.0")
            .about("Fills situacija and izvedeno reports from progress certificates")
            .arg(Arg::with_name("root")
                .long("root").takes_value(true).help("project root holding Input, Output and templates"))
            .arg(Arg::with_name("stage")
                .long("stage").takes_value(true)
                .possible_values(&["ingest", "backfill", "invoice", "execution", "summary"])
                .help("run a single stage instead of the whole pipeline"))
            .arg(Arg::with_name("verbose")
                .short("v").long("verbose").help("enable debug logging"))
            .get_matches();

        Self {
            root: matches.value_of("root").map(str::to_string),
            stage: matches.value_of("stage").map(str::to_string),
            verbose: matches.is_present("verbose"),
        }
    }
}
