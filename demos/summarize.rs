use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    experiment_summary::example_apps::run_summarize(std::env::args().skip(1))
}
