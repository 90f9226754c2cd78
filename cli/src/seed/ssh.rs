//! SSH material for agent containers.
//!
//! Key material is streamed through stdin (`cat > file`) so it never appears
//! on a command line or in process listings.

/// A content write into a container file plus its chmod, executed as a tiny
/// `bash -lc` snippet reading from stdin.
#[derive(Debug, Clone)]
pub struct WriteStep {
    pub content: Vec<u8>,
    pub script: String,
}

/// Steps writing private/public keys, known_hosts, and the ssh config into
/// the agent HOME with correct permissions. Empty contents are skipped.
#[must_use]
pub fn build_write_steps(
    home: &str,
    key: &[u8],
    pubkey: &[u8],
    known_hosts: &[u8],
    config: &str,
) -> Vec<WriteStep> {
    let mut steps = Vec::with_capacity(4);
    if !key.is_empty() {
        steps.push(WriteStep {
            content: key.to_vec(),
            script: format!(
                "mkdir -p '{home}'/.ssh && cat > '{home}'/.ssh/id_ed25519 && chmod 600 '{home}'/.ssh/id_ed25519"
            ),
        });
    }
    if !pubkey.is_empty() {
        steps.push(WriteStep {
            content: pubkey.to_vec(),
            script: format!(
                "mkdir -p '{home}'/.ssh && cat > '{home}'/.ssh/id_ed25519.pub && chmod 644 '{home}'/.ssh/id_ed25519.pub"
            ),
        });
    }
    if !known_hosts.is_empty() {
        steps.push(WriteStep {
            content: known_hosts.to_vec(),
            script: format!(
                "mkdir -p '{home}'/.ssh && cat > '{home}'/.ssh/known_hosts && chmod 644 '{home}'/.ssh/known_hosts"
            ),
        });
    }
    if !config.is_empty() {
        steps.push(WriteStep {
            content: config.as_bytes().to_vec(),
            script: format!(
                "mkdir -p '{home}'/.ssh && cat > '{home}'/.ssh/config && chmod 600 '{home}'/.ssh/config"
            ),
        });
    }
    steps
}

/// Write step for an RSA private key (used when the host only has id_rsa).
#[must_use]
pub fn rsa_write_step(home: &str, key: &[u8]) -> WriteStep {
    WriteStep {
        content: key.to_vec(),
        script: format!(
            "mkdir -p '{home}'/.ssh && cat > '{home}'/.ssh/id_rsa && chmod 600 '{home}'/.ssh/id_rsa"
        ),
    }
}

/// `mkdir -p` for the `.ssh` directory under an agent home.
#[must_use]
pub fn mkdir_ssh_script(home: &str) -> String {
    format!("mkdir -p '{home}/.ssh' && chmod 700 '{home}/.ssh'")
}

/// GitHub ssh config anchored at an agent home. `ssh.github.com:443` is the
/// route that passes the hardened egress; identity files are listed for the
/// key types actually present on the host.
#[must_use]
pub fn build_github_config(home: &str, has_ed25519: bool, has_rsa: bool) -> String {
    let mut identities = String::new();
    if has_ed25519 {
        identities.push_str(&format!("  IdentityFile {home}/.ssh/id_ed25519\n"));
    }
    if has_rsa {
        identities.push_str(&format!("  IdentityFile {home}/.ssh/id_rsa\n"));
    }
    if identities.is_empty() {
        identities.push_str(&format!("  IdentityFile {home}/.ssh/id_ed25519\n"));
    }
    format!(
        "Host github.com\n\
         \x20 HostName ssh.github.com\n\
         \x20 Port 443\n\
         \x20 User git\n\
         {identities}\
         \x20 IdentitiesOnly yes\n\
         \x20 StrictHostKeyChecking accept-new\n\
         \x20 UserKnownHostsFile {home}/.ssh/known_hosts\n\
         \n\
         Host ssh.github.com\n\
         \x20 HostName ssh.github.com\n\
         \x20 Port 443\n\
         \x20 User git\n\
         {identities}\
         \x20 IdentitiesOnly yes\n\
         \x20 StrictHostKeyChecking accept-new\n\
         \x20 UserKnownHostsFile {home}/.ssh/known_hosts\n"
    )
}

/// Scripts that configure git for an agent HOME and repo path: wait for the
/// ssh config to land, set the global `core.sshCommand`, align the container
/// user's HOME with the anchored `.ssh`/`.gitconfig`, scrub any repo-local
/// override, then validate with a best-effort pull.
#[must_use]
pub fn build_configure_scripts(home: &str, repo_path: &str) -> Vec<String> {
    vec![
        format!(
            "home=\"{home}\"; for i in $(seq 1 20); do [ -s \"$home/.ssh/config\" ] && break || sleep 0.25; done"
        ),
        format!(
            "home=\"{home}\"; HOME=\"$home\" git config --global core.sshCommand \"ssh -F ~/.ssh/config\""
        ),
        format!(
            "home=\"{home}\"; user_home=\"${{HOME:-}}\"; \
             if [ -z \"$user_home\" ] || [ ! -d \"$user_home\" ] || [ ! -w \"$user_home\" ]; then \
             for candidate in /home/dev /home/node; do \
             if [ -d \"$candidate\" ] && [ -w \"$candidate\" ]; then user_home=\"$candidate\"; break; fi; done; fi; \
             if [ -n \"$user_home\" ] && [ \"$user_home\" != \"$home\" ]; then \
             mkdir -p \"$user_home\"; \
             if [ -e \"$user_home/.ssh\" ] && [ ! -L \"$user_home/.ssh\" ]; then rm -rf \"$user_home/.ssh\"; fi; \
             ln -sfn \"$home/.ssh\" \"$user_home/.ssh\"; \
             if [ -e \"$user_home/.gitconfig\" ] && [ ! -L \"$user_home/.gitconfig\" ]; then rm -f \"$user_home/.gitconfig\"; fi; \
             ln -sfn \"$home/.gitconfig\" \"$user_home/.gitconfig\"; fi"
        ),
        format!("cd '{repo_path}' && git config --unset core.sshCommand || true"),
        format!(
            "home=\"{home}\"; set -e; cd '{repo_path}'; \
             HOME=\"$home\" GIT_SSH_COMMAND=\"ssh -F ~/.ssh/config\" git pull --ff-only || true"
        ),
    ]
}
