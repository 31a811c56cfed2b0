use owo_colors::OwoColorize as _;

fn main() {
  let result = coproc::run();
  coproc_core::logging::shutdown();
  match result {
    Ok(code) => std::process::exit(code),
    Err(err) => {
      anstream::eprintln!("{}", format!("{err:#}").red());
      std::process::exit(1);
    }
  }
}
