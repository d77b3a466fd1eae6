//! siteprov command-line entry point.

mod args;
mod run;

fn main() {
    if let Err(code) = run::run() {
        std::process::exit(code);
    }
}
