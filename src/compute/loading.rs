// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::status::Error;
use std::path::Path;

/// Reads a whole file with `async_file`.
pub(crate) async fn read_file(path: &Path, priority: async_file::Priority) -> Result<Vec<u8>, Error> {
    let file = async_file::File::open(path, priority).await.map_err(|err| file_error(path, &err))?;
    let data = file.read_all(priority).await.map_err(|err| file_error(path, &err))?;
    logwise::trace_sync!(
        "Loaded {len} bytes from {path}",
        len = data.len(),
        path = logwise::privacy::LogIt(&path)
    );
    Ok(data.to_vec())
}

fn file_error(path: &Path, err: &impl std::fmt::Debug) -> Error {
    logwise::error_sync!(
        "Cannot read {path}: {err}",
        path = logwise::privacy::LogIt(&path),
        err = logwise::privacy::LogIt(err)
    );
    Error::File(format!("{}: {err:?}", path.display()))
}
