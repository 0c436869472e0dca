use crate::event::Fired;
use futures::future::LocalBoxFuture;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::io::{Error, ErrorKind};
use std::rc::Rc;

/// What a callback evaluates to.
pub type CallbackFuture = LocalBoxFuture<'static, std::io::Result<()>>;

/// The canonical callable every registration stores.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(Fired) -> CallbackFuture>);

impl Handler {
    /// Wrap an async callback.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Fired) -> Fut + 'static,
        Fut: Future<Output = std::io::Result<()>> + 'static,
    {
        Handler(Rc::new(move |fired| -> CallbackFuture { Box::pin(f(fired)) }))
    }

    /// Wrap a callback that never suspends.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Fired) -> std::io::Result<()> + 'static,
    {
        Self::new(move |fired| std::future::ready(f(fired)))
    }

    pub(crate) fn call(&self, fired: Fired) -> CallbackFuture {
        (self.0)(fired)
    }
}

impl Debug for Handler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handler")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// A receiver that can look its methods up by name.
pub trait Methods: Debug {
    /// Bind the method `name` to this receiver.
    fn method(self: Rc<Self>, name: &str) -> Option<Handler>;
}

/// The shapes a host may hand a callback in.
#[derive(Debug, Clone)]
pub enum Callback {
    /// Directly callable.
    Handler(Handler),
    /// A receiver and the name of one of its methods.
    Method(Rc<dyn Methods>, String),
    /// A free function name, or `Type::method`.
    Named(String),
}

impl From<Handler> for Callback {
    fn from(handler: Handler) -> Self {
        Callback::Handler(handler)
    }
}

impl From<&str> for Callback {
    fn from(name: &str) -> Self {
        Callback::Named(name.to_owned())
    }
}

impl From<String> for Callback {
    fn from(name: String) -> Self {
        Callback::Named(name)
    }
}

impl<M: Methods + 'static> From<(Rc<M>, &str)> for Callback {
    fn from((receiver, method): (Rc<M>, &str)) -> Self {
        Callback::Method(receiver, method.to_owned())
    }
}

/// Resolves every [`Callback`] shape to a [`Handler`].
#[derive(Debug, Default)]
pub struct Resolver {
    functions: HashMap<String, Handler>,
    types: HashMap<String, Rc<dyn Methods>>,
}

impl Resolver {
    /// Make `handler` reachable as `Callback::Named(name)`.
    pub fn register_function(&mut self, name: impl Into<String>, handler: Handler) {
        _ = self.functions.insert(name.into(), handler);
    }

    /// Make the methods of `receiver` reachable as `Callback::Named("name::method")`.
    pub fn register_type(&mut self, name: impl Into<String>, receiver: Rc<dyn Methods>) {
        _ = self.types.insert(name.into(), receiver);
    }

    /// Normalize `callback`.
    ///
    /// # Errors
    /// if the callback names a function, type or method that does not exist.
    pub fn resolve(&self, callback: Callback) -> std::io::Result<Handler> {
        match callback {
            Callback::Handler(handler) => Ok(handler),
            Callback::Method(receiver, method) => {
                let described = format!("{receiver:?}::{method}");
                receiver
                    .method(&method)
                    .ok_or_else(|| unresolved(&described))
            }
            Callback::Named(name) => {
                if let Some((ty, method)) = name.split_once("::") {
                    self.types
                        .get(ty)
                        .and_then(|receiver| Rc::clone(receiver).method(method))
                        .ok_or_else(|| unresolved(&name))
                } else {
                    self.functions
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| unresolved(&name))
                }
            }
        }
    }
}

fn unresolved(callback: &str) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!("callback {callback} can not be resolved"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Args, Handle, Target};
    use std::cell::Cell;

    #[derive(Debug, Default)]
    struct Connection {
        checked: Cell<usize>,
    }

    impl Methods for Connection {
        fn method(self: Rc<Self>, name: &str) -> Option<Handler> {
            match name {
                "checkConnection" => Some(Handler::sync(move |_| {
                    self.checked.set(self.checked.get() + 1);
                    Ok(())
                })),
                _ => None,
            }
        }
    }

    fn fire(handler: &Handler) -> std::io::Result<()> {
        let args: Args = Rc::from(Vec::new());
        futures::executor::block_on(handler.call(Fired::new(Target::Timer(Handle(1)), args)))
    }

    #[test]
    fn direct_handler() {
        let resolver = Resolver::default();
        let handler = resolver
            .resolve(Callback::from(Handler::sync(|_| Ok(()))))
            .unwrap();
        fire(&handler).unwrap();
    }

    #[test]
    fn receiver_and_method() {
        let resolver = Resolver::default();
        let connection = Rc::new(Connection::default());
        let handler = resolver
            .resolve(Callback::from((Rc::clone(&connection), "checkConnection")))
            .unwrap();
        fire(&handler).unwrap();
        assert_eq!(1, connection.checked.get());

        let error = resolver
            .resolve(Callback::from((connection, "missing")))
            .unwrap_err();
        assert_eq!(ErrorKind::InvalidInput, error.kind());
    }

    #[test]
    fn named_function_and_static_method() {
        let mut resolver = Resolver::default();
        resolver.register_function(
            "on_tick",
            Handler::sync(|_| Err(Error::new(ErrorKind::Other, "tick"))),
        );
        let connection = Rc::new(Connection::default());
        resolver.register_type("Connection", Rc::clone(&connection) as Rc<dyn Methods>);

        let tick = resolver.resolve(Callback::from("on_tick")).unwrap();
        assert_eq!("tick", fire(&tick).unwrap_err().to_string());

        let check = resolver
            .resolve(Callback::from("Connection::checkConnection"))
            .unwrap();
        fire(&check).unwrap();
        assert_eq!(1, connection.checked.get());

        for name in ["missing", "Connection::missing", "Missing::checkConnection"] {
            let error = resolver.resolve(Callback::from(name)).unwrap_err();
            assert_eq!(ErrorKind::InvalidInput, error.kind(), "{name}");
        }
    }
}
