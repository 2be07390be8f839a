pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use approx::abs_diff_eq;
pub use getset::{CopyGetters, Getters};
pub use itertools::{izip, Itertools as _};
pub use log::{debug, info, warn};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    fmt::{self, Display},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
};
pub use tch::{nn, Device, IndexOp, Kind, Reduction, Tensor};
pub use tch_tensor_like::TensorLike;

unzip_n::unzip_n!(pub 2);
unzip_n::unzip_n!(pub 3);
unzip_n::unzip_n!(pub 5);
