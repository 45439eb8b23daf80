//! Engine install scripts per operating system (Tera templates)
//!
//! `Some("")` marks systems whose images ship the engine. `None` means the
//! system is unknown to the engine.

use machine_core::OperatingSystem;

const CONTAINERD_APT: &str = r#"mkdir -p /etc/apt/keyrings
curl -fsSL https://download.docker.com/linux/ubuntu/gpg | gpg --dearmor --yes -o /etc/apt/keyrings/docker.gpg
echo "deb [signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable" > /etc/apt/sources.list.d/docker.list
apt-get update
DEBIAN_FRONTEND=noninteractive apt-get install -y --allow-downgrades containerd.io={{ containerd_version }}
apt-mark hold containerd.io
systemctl daemon-reload
systemctl enable --now containerd
systemctl restart containerd
"#;

const CONTAINERD_YUM: &str = r#"yum install -y yum-utils
yum-config-manager --add-repo=https://download.docker.com/linux/centos/docker-ce.repo
yum-config-manager --save --setopt=docker-ce-stable.module_hotfixes=true
yum install -y containerd.io-{{ containerd_version }} yum-plugin-versionlock
yum versionlock add containerd.io
systemctl daemon-reload
systemctl enable --now containerd
systemctl restart containerd
"#;

const CONTAINERD_AMZN2: &str = r#"yum install -y containerd-{{ containerd_version }} yum-plugin-versionlock
yum versionlock add containerd
systemctl daemon-reload
systemctl enable --now containerd
systemctl restart containerd
"#;

const DOCKER_APT: &str = r#"mkdir -p /etc/apt/keyrings
curl -fsSL https://download.docker.com/linux/ubuntu/gpg | gpg --dearmor --yes -o /etc/apt/keyrings/docker.gpg
echo "deb [signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable" > /etc/apt/sources.list.d/docker.list
apt-get update
DEBIAN_FRONTEND=noninteractive apt-get install -y --allow-downgrades \
    containerd.io={{ containerd_version }} \
    docker-ce=5:{{ docker_version }}* \
    docker-ce-cli=5:{{ docker_version }}*
apt-mark hold docker-ce* containerd.io
systemctl daemon-reload
systemctl enable --now docker
systemctl restart docker
"#;

const DOCKER_YUM: &str = r#"yum install -y yum-utils
yum-config-manager --add-repo=https://download.docker.com/linux/centos/docker-ce.repo
yum-config-manager --save --setopt=docker-ce-stable.module_hotfixes=true
yum install -y yum-plugin-versionlock \
    containerd.io-{{ containerd_version }} \
    docker-ce-{{ docker_version }}* \
    docker-ce-cli-{{ docker_version }}*
yum versionlock add docker-ce* containerd.io
systemctl daemon-reload
systemctl enable --now docker
systemctl restart docker
"#;

const DOCKER_AMZN2: &str = r#"yum install -y docker-{{ docker_version }}* yum-plugin-versionlock
yum versionlock add docker
systemctl daemon-reload
systemctl enable --now docker
systemctl restart docker
"#;

pub fn containerd_template(os: &OperatingSystem) -> Option<&'static str> {
    match os {
        OperatingSystem::Ubuntu => Some(CONTAINERD_APT),
        OperatingSystem::CentOS | OperatingSystem::Rhel | OperatingSystem::RockyLinux => {
            Some(CONTAINERD_YUM)
        }
        OperatingSystem::AmazonLinux2 => Some(CONTAINERD_AMZN2),
        OperatingSystem::Flatcar | OperatingSystem::Sles => Some(""),
        OperatingSystem::Other(_) => None,
    }
}

pub fn docker_template(os: &OperatingSystem) -> Option<&'static str> {
    match os {
        OperatingSystem::Ubuntu => Some(DOCKER_APT),
        OperatingSystem::CentOS | OperatingSystem::Rhel | OperatingSystem::RockyLinux => {
            Some(DOCKER_YUM)
        }
        OperatingSystem::AmazonLinux2 => Some(DOCKER_AMZN2),
        OperatingSystem::Flatcar | OperatingSystem::Sles => Some(""),
        OperatingSystem::Other(_) => None,
    }
}
