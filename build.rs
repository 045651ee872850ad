use vergen::{BuildBuilder, Emitter};
use vergen_git2::Git2Builder;

// Emits VERGEN_BUILD_TIMESTAMP and VERGEN_GIT_DESCRIBE for `--version`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_timestamp(true).build()?;
    let git2 = Git2Builder::default().describe(true, true, None).build();

    let mut emitter = Emitter::default();
    emitter.add_instructions(&build)?;
    match git2 {
        Ok(git2) => {
            emitter.add_instructions(&git2)?;
        }
        // Source tarballs have no repository to describe
        Err(_) => println!("cargo:rustc-env=VERGEN_GIT_DESCRIBE=unknown"),
    }
    emitter.emit()?;

    Ok(())
}
