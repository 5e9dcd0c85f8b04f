pub(crate) mod check;
pub(crate) mod serve;

pub(crate) use check::check;
pub(crate) use serve::serve;
