use std::env;

fn main() {
    // Heroku doesn't have the git repository, so we need to get the
    // SHA from the environment variable it provides.
    if let Ok(source_version) = env::var("SOURCE_VERSION") {
        println!("cargo:rustc-env=VERGEN_GIT_SHA={}", source_version);
        return;
    }

    let mut config = vergen::Config::default();
    // The SHA is all we consume; semver generation wants tags we may not
    // have.
    *config.git_mut().semver_mut() = false;

    if vergen::vergen(config).is_err() {
        // Source archives have neither git nor the Heroku variable.
        println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
    }
}
