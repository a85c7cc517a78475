use serde::Serialize;

/// Value of systemd's `ProtectSystem=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectSystem {
    Strict,
}

/// How the supervisor assigns the process identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ServiceIdentity {
    /// An ephemeral user allocated by the supervisor on each start.
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesystemPolicy {
    private_tmp: bool,
    protect_system: ProtectSystem,
    protect_home: bool,
    private_devices: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivilegePolicy {
    no_new_privileges: bool,
    capability_bounding_set: Vec<String>,
    ambient_capabilities: Vec<String>,
    restrict_suid_sgid: bool,
    restrict_realtime: bool,
    lock_personality: bool,
    memory_deny_write_execute: bool,
    remove_ipc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelPolicy {
    protect_kernel_modules: bool,
    protect_kernel_logs: bool,
    protect_kernel_tunables: bool,
    protect_control_groups: bool,
    protect_clock: bool,
    protect_hostname: bool,
    proc_subset: &'static str,
    protect_proc: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyscallPolicy {
    restrict_namespaces: bool,
    architectures: &'static str,
    allow: Vec<String>,
    deny: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkPolicy {
    address_families: Vec<String>,
    ip_address_deny: Vec<String>,
}

/// The fixed restriction policy every generated unit carries.
///
/// There is exactly one profile. It is built once by [`SecurityProfile::hardened`]
/// and shared by reference; no field can be changed after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityProfile {
    filesystem: FilesystemPolicy,
    privilege: PrivilegePolicy,
    kernel: KernelPolicy,
    syscalls: SyscallPolicy,
    network: NetworkPolicy,
    identity: ServiceIdentity,
    umask: u32,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn yes(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_owned()
}

impl SecurityProfile {
    pub fn hardened() -> Self {
        Self {
            filesystem: FilesystemPolicy {
                private_tmp: true,
                protect_system: ProtectSystem::Strict,
                protect_home: true,
                private_devices: true,
            },
            privilege: PrivilegePolicy {
                no_new_privileges: true,
                capability_bounding_set: Vec::new(),
                ambient_capabilities: Vec::new(),
                restrict_suid_sgid: true,
                restrict_realtime: true,
                lock_personality: true,
                memory_deny_write_execute: true,
                remove_ipc: true,
            },
            kernel: KernelPolicy {
                protect_kernel_modules: true,
                protect_kernel_logs: true,
                protect_kernel_tunables: true,
                protect_control_groups: true,
                protect_clock: true,
                protect_hostname: true,
                proc_subset: "pid",
                protect_proc: "invisible",
            },
            syscalls: SyscallPolicy {
                restrict_namespaces: true,
                architectures: "native",
                allow: strings(&["@system-service"]),
                deny: strings(&["@resources", "@privileged"]),
            },
            network: NetworkPolicy {
                address_families: strings(&["AF_UNIX"]),
                ip_address_deny: strings(&["any"]),
            },
            identity: ServiceIdentity::Dynamic,
            umask: 0o077,
        }
    }

    pub fn identity(&self) -> ServiceIdentity {
        self.identity
    }

    pub fn capability_bounding_set(&self) -> &[String] {
        &self.privilege.capability_bounding_set
    }

    pub fn address_families(&self) -> &[String] {
        &self.network.address_families
    }

    pub fn umask(&self) -> u32 {
        self.umask
    }

    /// `(key, value)` pairs in rendering order. Keys may repeat
    /// (`SystemCallFilter=` appears once for the allow list and once for the
    /// deny list).
    pub fn directives(&self) -> Vec<(&'static str, String)> {
        let fs = &self.filesystem;
        let p = &self.privilege;
        let k = &self.kernel;
        let s = &self.syscalls;
        let n = &self.network;

        let mut out = vec![
            ("PrivateTmp", yes(fs.private_tmp)),
            (
                "ProtectSystem",
                match fs.protect_system {
                    ProtectSystem::Strict => "strict".to_owned(),
                },
            ),
            ("ProtectHome", yes(fs.protect_home)),
            ("PrivateDevices", yes(fs.private_devices)),
            ("NoNewPrivileges", yes(p.no_new_privileges)),
            ("CapabilityBoundingSet", p.capability_bounding_set.join(" ")),
            ("AmbientCapabilities", p.ambient_capabilities.join(" ")),
            ("RestrictSUIDSGID", yes(p.restrict_suid_sgid)),
            ("RestrictRealtime", yes(p.restrict_realtime)),
            ("LockPersonality", yes(p.lock_personality)),
            ("MemoryDenyWriteExecute", yes(p.memory_deny_write_execute)),
            ("RemoveIPC", yes(p.remove_ipc)),
            ("ProtectKernelModules", yes(k.protect_kernel_modules)),
            ("ProtectKernelLogs", yes(k.protect_kernel_logs)),
            ("ProtectKernelTunables", yes(k.protect_kernel_tunables)),
            ("ProtectControlGroups", yes(k.protect_control_groups)),
            ("ProtectClock", yes(k.protect_clock)),
            ("ProtectHostname", yes(k.protect_hostname)),
            ("ProcSubset", k.proc_subset.to_owned()),
            ("ProtectProc", k.protect_proc.to_owned()),
            ("RestrictNamespaces", yes(s.restrict_namespaces)),
            ("SystemCallArchitectures", s.architectures.to_owned()),
            ("SystemCallFilter", s.allow.join(" ")),
        ];
        if !s.deny.is_empty() {
            out.push(("SystemCallFilter", format!("~{}", s.deny.join(" "))));
        }
        out.push(("RestrictAddressFamilies", n.address_families.join(" ")));
        out.push(("IPAddressDeny", n.ip_address_deny.join(" ")));
        match self.identity {
            ServiceIdentity::Dynamic => out.push(("DynamicUser", yes(true))),
        }
        out.push(("UMask", format!("{:04o}", self.umask)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(d: &'a [(&'static str, String)], key: &str) -> Vec<&'a str> {
        d.iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn hardened_is_constant() {
        assert_eq!(SecurityProfile::hardened(), SecurityProfile::hardened());
        assert_eq!(
            SecurityProfile::hardened().directives(),
            SecurityProfile::hardened().directives()
        );
    }

    #[test]
    fn capability_sets_are_empty() {
        let d = SecurityProfile::hardened().directives();
        assert_eq!(value(&d, "CapabilityBoundingSet"), vec![""]);
        assert_eq!(value(&d, "AmbientCapabilities"), vec![""]);
        assert!(SecurityProfile::hardened().capability_bounding_set().is_empty());
    }

    #[test]
    fn network_is_unix_only() {
        let profile = SecurityProfile::hardened();
        assert_eq!(profile.address_families(), ["AF_UNIX".to_owned()]);
        let d = profile.directives();
        assert_eq!(value(&d, "RestrictAddressFamilies"), vec!["AF_UNIX"]);
        assert_eq!(value(&d, "IPAddressDeny"), vec!["any"]);
    }

    #[test]
    fn syscall_filter_allows_then_denies() {
        let d = SecurityProfile::hardened().directives();
        assert_eq!(
            value(&d, "SystemCallFilter"),
            vec!["@system-service", "~@resources @privileged"]
        );
        assert_eq!(value(&d, "SystemCallArchitectures"), vec!["native"]);
    }

    #[test]
    fn filesystem_and_kernel_protections_present() {
        let d = SecurityProfile::hardened().directives();
        for key in [
            "PrivateTmp",
            "ProtectHome",
            "NoNewPrivileges",
            "RestrictSUIDSGID",
            "RestrictRealtime",
            "ProtectKernelModules",
            "ProtectKernelLogs",
            "ProtectKernelTunables",
            "ProtectControlGroups",
            "RestrictNamespaces",
            "DynamicUser",
        ] {
            assert_eq!(value(&d, key), vec!["yes"], "{key}");
        }
        assert_eq!(value(&d, "ProtectSystem"), vec!["strict"]);
        assert_eq!(value(&d, "ProcSubset"), vec!["pid"]);
        assert_eq!(value(&d, "ProtectProc"), vec!["invisible"]);
        assert_eq!(value(&d, "UMask"), vec!["0077"]);
    }

    #[test]
    fn serializes_for_inspection() {
        let json = serde_json::to_value(SecurityProfile::hardened()).unwrap();
        assert_eq!(json["identity"], "dynamic");
        assert_eq!(json["network"]["address_families"][0], "AF_UNIX");
    }
}
