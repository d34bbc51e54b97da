pub mod profile_loader;
pub mod rubric_loader;

pub use profile_loader::{load_profiles, load_profiles_from_str};
pub use rubric_loader::{load_rubrics, Rubric, RubricBook};
