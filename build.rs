#![forbid(unsafe_code)]

// Git metadata is best effort: source trees exported without a .git directory
// (release tarballs, vendored copies) must still build.
fn main() {
    match build_data::get_git_branch() {
        Ok(branch) => println!("cargo:rustc-env=GIT_BRANCH={}", branch),
        Err(_) => println!("cargo:rustc-env=GIT_BRANCH=unknown"),
    }
    match build_data::get_git_commit_short() {
        Ok(commit) => println!("cargo:rustc-env=GIT_COMMIT_SHORT={}", commit),
        Err(_) => println!("cargo:rustc-env=GIT_COMMIT_SHORT=unknown"),
    }
    match build_data::get_git_dirty() {
        Ok(dirty) => println!("cargo:rustc-env=GIT_DIRTY={}", dirty),
        Err(_) => println!("cargo:rustc-env=GIT_DIRTY=unknown"),
    }
    build_data::set_RUSTC_VERSION();
}
