//! Plugin side of the protocol, for plugins written in Rust.
//!
//! ```ignore
//! struct Banner;
//!
//! impl Handler for Banner {
//!     fn name(&self) -> &str { "banner" }
//!     fn capabilities(&self) -> Vec<Capability> { vec![Capability::HtmlRendered] }
//!     fn on_html_rendered(&mut self, _path: &str, mut html: Vec<u8>) -> HookResult<Vec<u8>> {
//!         html.extend_from_slice(b"<!-- built with evoke -->");
//!         Ok(html)
//!     }
//! }
//!
//! fn main() -> std::io::Result<()> {
//!     evoke::plugin::server::serve_stdio(&mut Banner)
//! }
//! ```

use std::env;
use std::io::{self, BufReader, BufWriter, Read, Write};

use super::protocol::{
    COOKIE_KEY, COOKIE_VALUE, Capability, ContentPayload, Handshake, PROTOCOL_VERSION,
    PipelineDecl, Request, Response, WireAsset, read_frame, write_frame,
};

/// Hooks report failures as plain messages; the host turns them into
/// build errors.
pub type HookResult<T> = Result<T, String>;

/// Plugin behavior. Every hook defaults to passing its input through.
///
/// Only hooks listed in [`Handler::capabilities`] are ever called.
pub trait Handler {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Vec<Capability>;

    fn on_pre_build(&mut self) -> HookResult<()> {
        Ok(())
    }

    fn on_config_loaded(&mut self, config: Vec<u8>) -> HookResult<Vec<u8>> {
        Ok(config)
    }

    fn on_public_assets_copied(&mut self) -> HookResult<()> {
        Ok(())
    }

    fn on_content_loaded(&mut self, _path: &str, content: Vec<u8>) -> HookResult<Vec<u8>> {
        Ok(content)
    }

    fn on_content_render(&mut self, _path: &str, content: Vec<u8>) -> HookResult<Vec<u8>> {
        Ok(content)
    }

    fn on_html_rendered(&mut self, _path: &str, content: Vec<u8>) -> HookResult<Vec<u8>> {
        Ok(content)
    }

    fn on_post_build(&mut self) -> HookResult<()> {
        Ok(())
    }

    fn pipelines(&mut self) -> Vec<PipelineDecl> {
        Vec::new()
    }

    fn process_asset(&mut self, asset: WireAsset) -> HookResult<WireAsset> {
        Err(format!("no pipeline named `{}`", asset.pipeline))
    }
}

/// Serve over the process's stdin/stdout.
///
/// Refuses to run when the magic cookie is missing, which means the binary
/// was started by hand rather than by the build host.
pub fn serve_stdio<H: Handler>(handler: &mut H) -> io::Result<()> {
    let token = env::var(COOKIE_KEY).unwrap_or_default();
    if token != COOKIE_VALUE {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "this binary is an evoke plugin and is started by `evoke build`",
        ));
    }
    serve(handler, io::stdin().lock(), io::stdout().lock(), &token)
}

/// Send the handshake, then answer requests until `shutdown` or EOF.
pub fn serve<H, R, W>(handler: &mut H, reader: R, writer: W, token: &str) -> io::Result<()>
where
    H: Handler,
    R: Read,
    W: Write,
{
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    let hello = Handshake {
        protocol_version: PROTOCOL_VERSION,
        token: token.to_owned(),
        name: handler.name().to_owned(),
        capabilities: handler.capabilities(),
    };
    write_frame(&mut writer, &hello)?;
    writer.flush()?;

    loop {
        let request: Request = match read_frame(&mut reader) {
            Ok(request) => request,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        if request == Request::Shutdown {
            return Ok(());
        }

        let response = dispatch(handler, request);
        write_frame(&mut writer, &response)?;
        writer.flush()?;
    }
}

fn dispatch<H: Handler>(handler: &mut H, request: Request) -> Response {
    let supported = handler.capabilities();
    let allowed = |capability| supported.contains(&capability);

    let result = match request {
        Request::PreBuild if allowed(Capability::PreBuild) => handler.on_pre_build().map(|()| Response::Ok),
        Request::ConfigLoaded { config } if allowed(Capability::ConfigLoaded) => {
            handler.on_config_loaded(config).map(Response::Bytes)
        }
        Request::PublicAssetsCopied if allowed(Capability::PublicAssetsCopied) => {
            handler.on_public_assets_copied().map(|()| Response::Ok)
        }
        Request::ContentLoaded(ContentPayload { path, content }) if allowed(Capability::ContentLoaded) => {
            handler.on_content_loaded(&path, content).map(Response::Bytes)
        }
        Request::ContentRender(ContentPayload { path, content }) if allowed(Capability::ContentRender) => {
            handler.on_content_render(&path, content).map(Response::Bytes)
        }
        Request::HtmlRendered(ContentPayload { path, content }) if allowed(Capability::HtmlRendered) => {
            handler.on_html_rendered(&path, content).map(Response::Bytes)
        }
        Request::PostBuild if allowed(Capability::PostBuild) => handler.on_post_build().map(|()| Response::Ok),
        Request::RegisterPipelines if allowed(Capability::Pipelines) => {
            Ok(Response::Pipelines(handler.pipelines()))
        }
        Request::ProcessAsset(asset) if allowed(Capability::Pipelines) => {
            handler.process_asset(asset).map(Response::Asset)
        }
        _ => Ok(Response::Unimplemented),
    };

    result.unwrap_or_else(Response::Error)
}
