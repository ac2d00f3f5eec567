// src/constants.rs

/// The name of the directory holding tempsystem configuration (inside the system config dir).
pub const CONFIG_DIR_NAME: &str = "tempsystem";

/// The name of the optional configuration file (in ~/.config/tempsystem/).
pub const CONFIG_FILENAME: &str = "config.toml";

/// Image used when neither the CLI nor the config file names one.
pub const DEFAULT_IMAGE: &str = "archlinux:latest";

/// Runtime selection used when nothing else is configured.
pub const DEFAULT_RUNTIME: &str = "auto";

/// Runtimes searched for, in order, when the runtime is `auto`.
pub const RUNTIME_CANDIDATES: &[&str] = &["podman", "docker"];

/// Non-privileged user the interactive session runs as.
pub const DEFAULT_USER: &str = "tempsystem";

pub const DEFAULT_HOSTNAME: &str = "tempsystem";

/// Login shell installed by the first step and set for the session user.
pub const DEFAULT_SHELL: &str = "/usr/bin/zsh";

pub const DEFAULT_DNS: &[&str] = &["1.1.1.1", "1.0.0.1"];

/// Prefix of every generated container name.
pub const CONTAINER_NAME_PREFIX: &str = "tempsystem";

/// Packages installed by the first provisioning step, before any extras.
pub const BASE_PACKAGES: &[&str] = &[
    "zsh",
    "sudo",
    "git",
    "base-devel",
    "curl",
    "which",
    "less",
    "vim",
    "nano",
    "man-db",
    "pkgfile",
];

/// Remote installer for the oh-my-zsh framework.
pub const FRAMEWORK_INSTALLER_URL: &str =
    "https://raw.githubusercontent.com/ohmyzsh/ohmyzsh/master/tools/install.sh";

/// Where the installer is downloaded to inside the container.
pub const FRAMEWORK_INSTALLER_PATH: &str = "/tmp/ohmyzsh-install.sh";

/// Connection-refused retries for the installer download.
pub const DEFAULT_FETCH_RETRIES: u32 = 5;

/// Seconds curl waits for a connection before counting an attempt as failed.
pub const FETCH_CONNECT_TIMEOUT_SECS: u32 = 15;

/// Framework directory, relative to the user's home.
pub const FRAMEWORK_DIR: &str = ".oh-my-zsh";

/// Plugins cloned into `<home>/.oh-my-zsh/custom/plugins/<name>`.
pub const SHELL_PLUGINS: &[(&str, &str)] = &[
    (
        "zsh-autosuggestions",
        "https://github.com/zsh-users/zsh-autosuggestions",
    ),
    (
        "zsh-syntax-highlighting",
        "https://github.com/zsh-users/zsh-syntax-highlighting",
    ),
];

pub const MAKEPKG_CONF: &str = "/etc/makepkg.conf";

/// Packaging options appended to makepkg.conf before any AUR build.
pub const MAKEPKG_OPTIONS_LINE: &str =
    "OPTIONS=(strip !docs !libtool !staticlibs emptydirs zipman purge !debug !lto)";

pub const AUR_HELPER_REPO: &str = "https://aur.archlinux.org/yay.git";

/// Scratch directory the AUR helper is built in. Removed by the last step.
pub const AUR_HELPER_BUILD_DIR: &str = "/tmp/yay-build";

pub const AUR_HELPER_BIN: &str = "yay";

/// Where a staged command-not-found helper lands before provisioning moves it.
pub const STAGED_COMMAND_NOT_FOUND_PATH: &str = "/tmp/command-not-found.zsh";

/// Final location of the command-not-found helper.
pub const COMMAND_NOT_FOUND_TARGET: &str = "/usr/share/doc/pkgfile/command-not-found.zsh";

/// Scratch directory the interactive session starts in, relative to the user's home.
pub const WORK_DIR_NAME: &str = "work";

pub const HISTORY_FILENAME: &str = ".zsh_history";

/// Exit code reported when the run was interrupted by a signal.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

pub const PACMAN_CONF: &str = "/etc/pacman.conf";

/// Signing key of the Chaotic-AUR repository and where to fetch it from.
pub const CHAOTIC_AUR_KEY: &str = "3056513887B78AEB";
pub const CHAOTIC_AUR_KEYSERVER: &str = "keyserver.ubuntu.com";
pub const CHAOTIC_AUR_KEYRING_URL: &str =
    "https://cdn-mirror.chaotic.cx/chaotic-aur/chaotic-keyring.pkg.tar.zst";
pub const CHAOTIC_AUR_MIRRORLIST_URL: &str =
    "https://cdn-mirror.chaotic.cx/chaotic-aur/chaotic-mirrorlist.pkg.tar.zst";
pub const CHAOTIC_AUR_SECTION: &str = "[chaotic-aur]\nInclude = /etc/pacman.d/chaotic-mirrorlist";

/// The landware repository ships unsigned packages.
pub const LANDWARE_SECTION: &str = "[landware]\nServer = https://repo.kage.sj.strangled.net/landware/x86_64\nSigLevel = DatabaseNever PackageNever TrustedOnly";
