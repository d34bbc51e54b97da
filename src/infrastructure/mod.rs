pub mod chrome_surface;
pub mod js_executor;
pub mod page_surface;
pub mod scripts;

pub use chrome_surface::ChromeSurface;
pub use js_executor::JsExecutor;
pub use page_surface::{
    find_everywhere, DocContext, ElementInfo, ElementKind, ElementRef, FetchMode, Geometry, Key,
    PageEvent, PageLocation, PageSurface,
};
