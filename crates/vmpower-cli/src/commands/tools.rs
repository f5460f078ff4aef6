use vmpower_core::{TOOLS, command_exists, running_as_root};

pub fn run() {
    println!(
        "Running as root: {}",
        if running_as_root() { "yes" } else { "no (tools run via sudo -n)" }
    );
    println!();

    let mut missing = 0;
    for tool in TOOLS {
        if command_exists(tool) {
            println!("  \u{2705} {tool}");
        } else {
            missing += 1;
            println!("  \u{274C} {tool}");
        }
    }

    if missing > 0 {
        println!("\n{missing} tool(s) missing; cycles needing them will fail.");
    }
}
