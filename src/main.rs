use getopts::Options;
use sprig::{
    cli::{report, run, Action::*},
    core::{Config, Error},
};
use std::{
    env,
    io::{self, Read},
    process::exit,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let bin = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("o", "", "Output file name", "FILE");
    opts.optflag("S", "", "Print generated asm");
    opts.optflag("p", "", "Print the program tree");
    opts.optflag("c", "", "Closure convert before compiling");
    opts.optflag("h", "help", "print this help menu");

    let usage = opts.usage(&format!("Usage: {} [options] < program.json", bin));

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}\n\n{}", f, usage);
            exit(2)
        }
    };

    if matches.opt_present("h") {
        print!("{}", usage);
        return;
    }

    let parse = matches.opt_present("p");
    let asm = matches.opt_present("S");

    let output = matches
        .opt_str("o")
        .unwrap_or_else(|| String::from(if asm { "/dev/stdout" } else { "sprig" }));

    let mut program = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut program) {
        eprintln!("{}", report(&Error::from(e)));
        exit(1)
    }

    let config = Config { program, output, convert: matches.opt_present("c") };

    let action = if parse {
        Parse
    } else if asm {
        GenASM
    } else {
        Run
    };

    // Run the entire CLI with config
    match run(&config, action) {
        Err(e) => {
            eprintln!("{}", report(&e));
            exit(1)
        }
        Ok(Some(out)) => println!("{}", out),
        Ok(None) => {}
    }
}
