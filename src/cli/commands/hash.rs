//! Password hash helper.

use console::style;

use upload_gate::auth::hash_password;

/// Print a bcrypt hash of `password`.
pub fn cmd_hash_password(password: &str, cost: u32) -> anyhow::Result<()> {
    let hash = hash_password(password, cost)?;
    eprintln!(
        "{} Set BASIC_AUTH_PASSWORD to the hash below (cost {})",
        style("✓").green(),
        cost
    );
    println!("{}", hash);
    Ok(())
}
