pub mod modules;

pub use modules::ModuleDao;
