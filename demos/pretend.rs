use std::env;
use std::time::Duration;

use portage_inspect::{AcceptKeywords, DryRunResult, Emerge, Outcome};

const EXAMPLE: &str = r#"
These are the packages that would be merged, in reverse order:

Calculating dependencies  ... done!
[ebuild  N     ] media-libs/libplacebo-7.349.0::gentoo  USE="lcms opengl vulkan -test" 2,137 KiB
[ebuild  N    ~] media-video/mpv-0.38.0::gentoo  USE="alsa vaapi -lua -pipewire" 3,270 KiB

Total: 2 packages (2 new), Size of downloads: 5,407 KiB

The following keyword changes are necessary to proceed:
 (see "package.accept_keywords" in the portage(5) man page for more details)
# required by media-video/mpv (argument)
=media-video/mpv-0.38.0 ~amd64
"#;

fn main() {
    // `pretend <atom>` runs a real dry run, otherwise a canned report is used
    let (result, exit_code) = match env::args().nth(1) {
        Some(atom) => {
            let run = Emerge::default()
                .with_timeout(Duration::from_secs(300))
                .pretend(&atom)
                .expect("failed to run emerge");
            (run.result, run.exit_code)
        }
        None => (DryRunResult::parse(EXAMPLE), 1),
    };

    println!("=== Packages ===");
    for dep in &result.dependencies {
        println!(
            "{:<50} {:<16} {}",
            dep.atom,
            dep.version.as_deref().unwrap_or("-"),
            dep.use_flags.join(" ")
        );
    }

    match result.outcome(exit_code) {
        Outcome::Ready => println!("\nReady to merge."),
        Outcome::Failed => println!("\nDry run failed:\n{}", result.output),
        Outcome::NeedsUnmask => {
            println!("\n=== Masked ===");
            let mut unmask = AcceptKeywords::default();
            for masked in &result.masked {
                println!("{} ({})", masked.atom, masked.reason);
                if let Some(keyword) = masked.keyword() {
                    unmask.unmask(&masked.exact_atom(), &keyword);
                }
            }
            println!("\n=== Suggested package.accept_keywords ===");
            print!("{}", unmask.render());
        }
    }
}
