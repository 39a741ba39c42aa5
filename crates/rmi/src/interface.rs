//! # Shared Interfaces
//!
//! A shared interface is an async trait whose methods can be called across
//! the connection. `shared_interface!` declares one and generates everything
//! the registry needs to share it and proxy it:
//!
//! ```rust,ignore
//! rmi::shared_interface! {
//!     pub trait Chat as ChatInterface("demo.Chat") => ChatProxy {
//!         [unreliable] fn send(&self, text: String);
//!         fn poll(&self) -> String;
//!     }
//! }
//! ```
//!
//! expands to:
//!
//! - `trait Chat`, where every method is async and returns `rmi::Result<T>`.
//! - `struct ChatInterface`, implementing [`SharedInterface`]. It describes
//!   the methods and dispatches inbound calls to a `dyn Chat`.
//! - `struct ChatProxy`, the stub implementing `Chat` by forwarding each call
//!   through a [`RemoteObject`].
//!
//! A method without a return type is void. Void methods may carry
//! `[asynchronous]` or `[unreliable]` to become fire-and-forget; the marker
//! is ignored on methods that return a value.
//!
//! Arguments and results must implement `IntoValue` and `FromValue`.

use rmi_rpc::FromValue;
use rmi_rpc::Value;
use rmi_rpc::ValueError;

use crate::call_type::MethodShape;
use crate::error::Result;
use crate::proxy::RemoteObject;

/// Binds an interface trait to the registry.
///
/// Implemented on a marker type, normally by `shared_interface!`.
#[async_trait::async_trait]
pub trait SharedInterface: Send + Sync + 'static {
    /// Qualified name the peer resolves the interface by.
    const NAME: &'static str;

    /// The trait object shared objects are held as.
    type Object: ?Sized + Send + Sync + 'static;

    /// The stub handed out for remote objects.
    type Proxy: Send + Sync + 'static;

    /// Method shapes in declaration order.
    fn methods() -> &'static [MethodShape];

    /// Calls `method` on `target` with arguments received from the peer.
    async fn invoke(target: &Self::Object, method: &str, args: Vec<Value>) -> Result<Value>;

    fn proxy(remote: RemoteObject) -> Self::Proxy;
}

/// Reads the arguments of an inbound call in parameter order.
pub struct ArgReader {
    args: std::vec::IntoIter<Value>,
}

impl ArgReader {
    pub fn new(args: Vec<Value>) -> Self {
        Self { args: args.into_iter() }
    }

    pub fn read<T: FromValue>(&mut self) -> Result<T> {
        let value = self
            .args
            .next()
            .ok_or(ValueError { expected: "argument", found: "end of arguments" })?;
        Ok(T::from_value(value)?)
    }

    /// Fails if arguments are left over.
    pub fn finish(mut self) -> Result<()> {
        match self.args.next() {
            None => Ok(()),
            Some(extra) => Err(ValueError::mismatch("end of arguments", &extra).into()),
        }
    }
}

#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;
    pub use rmi_rpc::FromValue;
    pub use rmi_rpc::IntoValue;
    pub use rmi_rpc::Value;

    pub use crate::call_type::AsyncMarker;
    pub use crate::call_type::MethodShape;
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::interface::ArgReader;
    pub use crate::interface::SharedInterface;
    pub use crate::proxy::RemoteObject;
}

/// Declares a shared interface. See the module docs for the syntax.
#[macro_export]
macro_rules! shared_interface {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident as $iface:ident ($qualified:literal) => $proxy:ident {
            $(
                $(#[$mmeta:meta])*
                $([$marker:ident])?
                fn $method:ident(&self $(, $arg:ident : $ty:ty)*) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$meta])*
        #[$crate::interface::__private::async_trait]
        $vis trait $name: Send + Sync + 'static {
            $(
                $(#[$mmeta])*
                async fn $method(&self $(, $arg: $ty)*)
                    -> $crate::interface::__private::Result<$crate::__rmi_ret!($($ret)?)>;
            )*
        }

        /// Binds the interface to the registry.
        $vis struct $iface;

        #[$crate::interface::__private::async_trait]
        impl $crate::interface::__private::SharedInterface for $iface {
            const NAME: &'static str = $qualified;

            type Object = dyn $name;
            type Proxy = $proxy;

            fn methods() -> &'static [$crate::interface::__private::MethodShape] {
                const METHODS: &[$crate::interface::__private::MethodShape] = &[
                    $(
                        $crate::interface::__private::MethodShape {
                            name: stringify!($method),
                            params: &[$(stringify!($ty)),*],
                            returns: $crate::__rmi_returns!($($ret)?),
                            marker: $crate::__rmi_marker!($($marker)?),
                        },
                    )*
                ];
                METHODS
            }

            #[allow(unused_mut)]
            async fn invoke(
                target: &(dyn $name + 'static),
                method: &str,
                args: ::std::vec::Vec<$crate::interface::__private::Value>,
            ) -> $crate::interface::__private::Result<$crate::interface::__private::Value> {
                let mut reader = $crate::interface::__private::ArgReader::new(args);
                $(
                    if method == stringify!($method) {
                        $( let $arg: $ty = reader.read()?; )*
                        reader.finish()?;
                        let result = target.$method($($arg),*).await?;
                        return Ok($crate::interface::__private::IntoValue::into_value(result));
                    }
                )*
                Err($crate::interface::__private::Error::UnknownMethod(method.to_string()))
            }

            fn proxy(remote: $crate::interface::__private::RemoteObject) -> $proxy {
                $proxy { remote }
            }
        }

        /// Forwards every call to the remote object it stands for.
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        $vis struct $proxy {
            remote: $crate::interface::__private::RemoteObject,
        }

        impl $proxy {
            pub fn remote(&self) -> &$crate::interface::__private::RemoteObject {
                &self.remote
            }
        }

        #[$crate::interface::__private::async_trait]
        impl $name for $proxy {
            $(
                async fn $method(&self $(, $arg: $ty)*)
                    -> $crate::interface::__private::Result<$crate::__rmi_ret!($($ret)?)>
                {
                    let args = ::std::vec![
                        $($crate::interface::__private::IntoValue::into_value($arg)),*
                    ];
                    let value = self.remote.invoke::<$iface>(stringify!($method), args).await?;
                    Ok($crate::interface::__private::FromValue::from_value(value)?)
                }
            )*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __rmi_ret {
    () => { () };
    ($ret:ty) => { $ret };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __rmi_returns {
    () => { ::std::option::Option::None };
    ($ret:ty) => { ::std::option::Option::Some(stringify!($ret)) };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __rmi_marker {
    () => { ::std::option::Option::None };
    (asynchronous) => {
        ::std::option::Option::Some($crate::interface::__private::AsyncMarker::Reliable)
    };
    (unreliable) => {
        ::std::option::Option::Some($crate::interface::__private::AsyncMarker::Unreliable)
    };
}
