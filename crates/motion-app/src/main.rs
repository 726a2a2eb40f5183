mod cli;
mod run;

fn main() {
    if let Err(err) = run::run() {
        eprintln!("{err:?}");
        std::process::exit(-1);
    }
}
