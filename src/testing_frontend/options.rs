use gumdrop::Options;

#[derive(Debug, Options)]
pub struct AppOptions {
    #[options(help = "print this help message")]
    pub help: bool,

    #[options(help = "run a single ROM and print its serial output", meta = "PATH")]
    pub rom: String,

    #[options(help = "directory of Blargg test ROMs to run", meta = "DIR")]
    pub blargg_path: String,

    #[options(help = "directory of Mooneye test ROMs to run", meta = "DIR")]
    pub mooneye_path: String,

    #[options(help = "optional boot ROM image", meta = "PATH")]
    pub boot_rom: String,

    #[options(help = "master-clock budget per ROM", default = "200000000")]
    pub cycle_budget: u64,

    #[options(help = "verbose logging")]
    pub verbose: bool,
}
